use partscan_core::time::now_unix_timestamp;
use partscan_core::Verdict;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Workflow step. Advances strictly forward; the only way back to `Idle`
/// is a full [`Session::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Idle,
    ScanningQr,
    CapturingPart,
    Result,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("'{event}' is not allowed in step {from:?}")]
    InvalidTransition { from: Step, event: &'static str },
    #[error("decoded QR text must not be empty")]
    EmptyQrText,
    #[error("another '{0}' operation is still in flight")]
    Busy(&'static str),
}

/// Mutable state for one scan-and-match attempt.
///
/// Holds everything except the live camera stream, which the service owns
/// alongside this struct under the same lock. `verdict` is always derived
/// from `predicted_label` and `qr_text`, never set independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    step: Step,
    qr_text: String,
    captured_png: Option<Vec<u8>>,
    predicted_label: String,
    verdict: Verdict,
    last_error: Option<String>,
    /// Cancellation token: bumped on every reset and compared at async
    /// resume points, so stale callbacks become no-ops.
    generation: u64,
    updated_at: (i64, i32),
}

/// Cloneable read view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub step: Step,
    pub qr_text: String,
    pub predicted_label: String,
    pub verdict: Verdict,
    pub last_error: Option<String>,
    pub has_captured_image: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            step: Step::Idle,
            qr_text: String::new(),
            captured_png: None,
            predicted_label: String::new(),
            verdict: Verdict::Unset,
            last_error: None,
            generation: 0,
            updated_at: now_unix_timestamp(),
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn qr_text(&self) -> &str {
        &self.qr_text
    }

    pub fn predicted_label(&self) -> &str {
        &self.predicted_label
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn captured_png(&self) -> Option<&[u8]> {
        self.captured_png.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn updated_at(&self) -> (i64, i32) {
        self.updated_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step,
            qr_text: self.qr_text.clone(),
            predicted_label: self.predicted_label.clone(),
            verdict: self.verdict,
            last_error: self.last_error.clone(),
            has_captured_image: self.captured_png.is_some(),
        }
    }

    /// Idle -> ScanningQr. The caller must have a live camera stream
    /// before invoking this.
    pub fn begin_scan(&mut self) -> Result<(), SessionError> {
        if self.step != Step::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                event: "start",
            });
        }
        self.step = Step::ScanningQr;
        self.touch();
        Ok(())
    }

    /// ScanningQr -> CapturingPart on a successful, non-empty decode.
    /// The QR text is set once and stays immutable until reset.
    pub fn qr_decoded(&mut self, text: String) -> Result<(), SessionError> {
        if self.step != Step::ScanningQr {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                event: "qr_decoded",
            });
        }
        if text.is_empty() {
            return Err(SessionError::EmptyQrText);
        }
        self.qr_text = text;
        self.step = Step::CapturingPart;
        self.touch();
        Ok(())
    }

    /// CapturingPart -> Result with a classifier verdict.
    pub fn complete_capture(
        &mut self,
        image_png: Option<Vec<u8>>,
        predicted_label: String,
    ) -> Result<Verdict, SessionError> {
        if self.step != Step::CapturingPart {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                event: "capture",
            });
        }
        self.verdict = Verdict::of(&predicted_label, &self.qr_text);
        self.predicted_label = predicted_label;
        self.captured_png = image_png;
        self.step = Step::Result;
        self.touch();
        Ok(self.verdict)
    }

    /// CapturingPart -> Result after a classification failure.
    ///
    /// Fail-closed: the verdict is `Mismatch`, never accidentally equal to
    /// the QR text, and the workflow still reaches the result step instead
    /// of leaving the user stuck.
    pub fn fail_capture(
        &mut self,
        image_png: Option<Vec<u8>>,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        if self.step != Step::CapturingPart {
            return Err(SessionError::InvalidTransition {
                from: self.step,
                event: "capture",
            });
        }
        self.verdict = Verdict::Mismatch;
        self.captured_png = image_png;
        self.last_error = Some(message.into());
        self.step = Step::Result;
        self.touch();
        Ok(())
    }

    /// Records a surfaced error without changing step.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.touch();
    }

    /// Returns to `Idle`, clears every field, and bumps the generation so
    /// in-flight async callbacks become no-ops. Idempotent apart from the
    /// generation bump.
    pub fn reset(&mut self) {
        self.step = Step::Idle;
        self.qr_text.clear();
        self.captured_png = None;
        self.predicted_label.clear();
        self.verdict = Verdict::Unset;
        self.last_error = None;
        self.generation = self.generation.wrapping_add(1);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_unix_timestamp();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionError, Step};
    use partscan_core::Verdict;
    use proptest::prelude::*;

    fn session_at_capturing(qr: &str) -> Session {
        let mut session = Session::new();
        session.begin_scan().expect("start from idle");
        session.qr_decoded(qr.to_string()).expect("decode");
        session
    }

    #[test]
    fn full_pass_reaches_result_with_match() {
        let mut session = session_at_capturing("PART-123");
        let verdict = session
            .complete_capture(Some(vec![1, 2, 3]), "PART-123".to_string())
            .expect("capture from capturing step");

        assert_eq!(verdict, Verdict::Match);
        assert_eq!(session.step(), Step::Result);
        assert_eq!(session.qr_text(), "PART-123");
        assert_eq!(session.predicted_label(), "PART-123");
        assert!(session.captured_png().is_some());
    }

    #[test]
    fn differing_label_yields_mismatch() {
        let mut session = session_at_capturing("PART-123");
        let verdict = session
            .complete_capture(None, "PART-999".to_string())
            .expect("capture should transition");
        assert_eq!(verdict, Verdict::Mismatch);
    }

    #[test]
    fn start_is_rejected_outside_idle() {
        let mut session = Session::new();
        session.begin_scan().expect("first start");
        let err = session.begin_scan().expect_err("second start must fail");
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: Step::ScanningQr,
                event: "start"
            }
        );
    }

    #[test]
    fn qr_decode_is_rejected_outside_scanning() {
        let mut session = Session::new();
        let err = session
            .qr_decoded("PART-123".to_string())
            .expect_err("decode from idle must fail");
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: Step::Idle,
                event: "qr_decoded"
            }
        );
    }

    #[test]
    fn empty_qr_text_is_rejected() {
        let mut session = Session::new();
        session.begin_scan().expect("start");
        let err = session
            .qr_decoded(String::new())
            .expect_err("empty text must fail");
        assert_eq!(err, SessionError::EmptyQrText);
        assert_eq!(session.step(), Step::ScanningQr);
    }

    #[test]
    fn capture_is_rejected_before_qr_decode() {
        let mut session = Session::new();
        session.begin_scan().expect("start");
        let err = session
            .complete_capture(None, "PART-123".to_string())
            .expect_err("capture while scanning must fail");
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn fail_capture_is_fail_closed() {
        let mut session = session_at_capturing("PART-123");
        session
            .fail_capture(None, "inference failed: backend gone")
            .expect("fail_capture should transition");

        assert_eq!(session.step(), Step::Result);
        assert_eq!(session.verdict(), Verdict::Mismatch);
        assert_eq!(
            session.last_error(),
            Some("inference failed: backend gone")
        );
    }

    #[test]
    fn reset_clears_everything_and_bumps_generation() {
        let mut session = session_at_capturing("PART-123");
        session
            .complete_capture(Some(vec![0xFF]), "PART-123".to_string())
            .expect("capture");
        let generation = session.generation();

        session.reset();
        assert_eq!(session.step(), Step::Idle);
        assert_eq!(session.qr_text(), "");
        assert_eq!(session.predicted_label(), "");
        assert_eq!(session.verdict(), Verdict::Unset);
        assert_eq!(session.captured_png(), None);
        assert_eq!(session.last_error(), None);
        assert_eq!(session.generation(), generation + 1);

        // Idempotent apart from the generation bump.
        session.reset();
        assert_eq!(session.step(), Step::Idle);
        assert_eq!(session.generation(), generation + 2);
    }

    #[test]
    fn reset_from_idle_is_allowed() {
        let mut session = Session::new();
        session.reset();
        assert_eq!(session.step(), Step::Idle);
    }

    /// Events driven against the session in any order must keep the step
    /// inside the four-step domain and never skip a transition.
    #[test]
    fn arbitrary_event_sequences_never_skip_steps() {
        // 0 = start, 1 = qr_decoded, 2 = capture, 3 = reset
        let sequences: &[&[u8]] = &[
            &[2, 1, 0, 0, 1, 2, 3],
            &[0, 2, 2, 1, 1, 2, 0],
            &[3, 3, 0, 1, 3, 0, 1, 2, 2],
            &[1, 2, 3, 1, 2, 0, 3, 0],
        ];

        for sequence in sequences {
            let mut session = Session::new();
            for event in *sequence {
                let before = session.step();
                let _ = match event {
                    0 => session.begin_scan().map(|_| ()),
                    1 => session.qr_decoded("PART-1".to_string()).map(|_| ()),
                    2 => session.complete_capture(None, "PART-1".to_string()).map(|_| ()),
                    _ => {
                        session.reset();
                        Ok(())
                    }
                };
                let after = session.step();
                let allowed = matches!(
                    (before, after, event),
                    (_, _, 3)
                        | (Step::Idle, Step::ScanningQr, 0)
                        | (Step::ScanningQr, Step::CapturingPart, 1)
                        | (Step::CapturingPart, Step::Result, 2)
                ) || before == after;
                assert!(allowed, "illegal jump {before:?} -> {after:?} on event {event}");
            }
        }
    }

    proptest! {
        #[test]
        fn completed_verdict_matches_iff_labels_equal(qr in ".+", label in ".*") {
            let mut session = session_at_capturing(&qr);
            let verdict = session
                .complete_capture(None, label.clone())
                .expect("capture from capturing step");
            if label == qr {
                prop_assert_eq!(verdict, Verdict::Match);
            } else {
                prop_assert_eq!(verdict, Verdict::Mismatch);
            }
            prop_assert_eq!(session.step(), Step::Result);
        }
    }
}
