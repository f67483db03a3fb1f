use crate::state::{Asset, JobStatus};

/// Read-only notifications about job progress
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A job moved to a new status
    StatusChanged { job_id: String, status: JobStatus },

    /// A terminal asset was appended to a job
    AssetAdded { job_id: String, asset: Asset },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::StatusChanged { job_id, .. } | Self::AssetAdded { job_id, .. } => job_id,
        }
    }
}
