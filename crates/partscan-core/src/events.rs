use crate::types::Verdict;
use serde::{Deserialize, Serialize};

/// Events published by the workflow for observers (UI, agent logging).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemEvent {
    ScanStarted,
    QrDecoded { qr_text: String },
    PartCaptured { width: u32, height: u32 },
    VerdictReached { predicted_label: String, verdict: Verdict },
    WorkflowReset,
    ErrorRaised { source: String, message: String },
}
