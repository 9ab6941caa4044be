/// Which stage of a window a worker is in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Fetching,
    Histogramming,
    Writing,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub window_index: usize,
    pub worker_id: usize,
    pub stage: Stage,
}

impl WorkerStatus {
    pub fn new(progress: f32, window_index: usize, worker_id: usize, stage: Stage) -> Self {
        Self {
            progress,
            window_index,
            worker_id,
            stage,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetching => write!(f, "fetching"),
            Self::Histogramming => write!(f, "histogramming"),
            Self::Writing => write!(f, "writing"),
        }
    }
}
