pub mod pdf;
pub mod trainer;

pub use pdf::{load_pdf_files, load_pdf_folder};
pub use trainer::{chunk_id, Trainer, TrainingReport};
