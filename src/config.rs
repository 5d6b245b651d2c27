use std::path::PathBuf;

pub const DEFAULT_DATASET_PATH: &str = "dataset_kaggle.json";
pub const DEFAULT_METRICS_PATH: &str = "model_results.json";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub dataset_path: PathBuf,
    pub metrics_path: PathBuf,
}
