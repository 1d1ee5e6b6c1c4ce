pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use service::{ConfigService, EnvFileStatus};
pub use settings::{
    LlmSettings, RetrievalSettings, ServerSettings, Settings, SplitterKind, StorageSettings,
    TrainerSettings,
};
