//! Drives the solve-retry state machine against a live browsing session.

use chrono::Local;
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SolverConfig;
use crate::ocr::{keep_alphanumeric, ImageTextExtractor, Recognizer};
use crate::solver::session::{wait_for_page_ready, BrowserSession, Selector};
use crate::solver::state::{transition, Effect, Observation, SolveState};

/// One pass through the loop, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveAttempt {
    /// Attempt number (1-based)
    pub attempt: u32,
    /// Text recovered in this attempt, empty if none
    pub text: String,
    /// Whether the challenge was gone at the end of this attempt
    pub success: bool,
}

/// Outcome of a solve session.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub success: bool,
    pub attempts: Vec<SolveAttempt>,
    pub final_state: SolveState,
}

/// Solves captcha challenges with a given text extractor.
///
/// One solver can be reused across sessions, but each `solve` call owns its
/// own attempt counter.
pub struct CaptchaSolver<R> {
    extractor: ImageTextExtractor<R>,
    config: SolverConfig,
    abort: Option<Arc<AtomicBool>>,
}

impl<R: Recognizer> CaptchaSolver<R> {
    pub fn new(extractor: ImageTextExtractor<R>, config: SolverConfig) -> Self {
        Self {
            extractor,
            config,
            abort: None,
        }
    }

    /// Checks `flag` before every detection; once set the session gives up.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Solves the challenge on the current page if there is one.
    ///
    /// Returns `true` when no challenge is (or remains) present. An unsolved
    /// challenge is reported as `false`, never as an error.
    pub fn solve<S: BrowserSession>(&self, session: &mut S) -> bool {
        self.solve_with_report(session).success
    }

    /// Like [`solve`](Self::solve), with per-attempt details.
    pub fn solve_with_report<S: BrowserSession>(&self, session: &mut S) -> SolveReport {
        let max_attempts = self.config.max_attempts;
        let mut state = SolveState::initial(max_attempts);
        let mut effect = if state.is_terminal() {
            Effect::Finish { success: false }
        } else {
            Effect::Detect
        };

        if !state.is_terminal() && self.config.page_ready_timeout_ms > 0 {
            if let Err(e) = wait_for_page_ready(
                session,
                self.config.page_ready_timeout(),
                self.config.poll_interval(),
            ) {
                tracing::warn!(error = %e, "page not ready, trying anyway");
            }
        }

        let mut capture: Option<RgbImage> = None;
        let mut attempts: Vec<SolveAttempt> = Vec::new();

        loop {
            let observation = match &effect {
                Effect::Finish { success } => {
                    if let Some(last) = attempts.last_mut() {
                        last.success = *success;
                    }
                    break;
                }
                Effect::Detect if self.abort_requested() => {
                    tracing::info!("abort requested, stopping captcha solving");
                    Observation::Aborted
                }
                Effect::Detect => {
                    tracing::info!(
                        attempt = state.attempt(),
                        max_attempts,
                        "captcha solving attempt"
                    );
                    attempts.push(SolveAttempt {
                        attempt: state.attempt(),
                        text: String::new(),
                        success: false,
                    });
                    self.detect(session, state.attempt(), &mut capture)
                }
                Effect::Recognize => {
                    let text = capture
                        .take()
                        .map(|img| keep_alphanumeric(&self.extractor.extract_image(&img)))
                        .unwrap_or_default();
                    if text.is_empty() {
                        tracing::warn!(attempt = state.attempt(), "failed to extract text from captcha");
                        Observation::NoText
                    } else {
                        tracing::info!(attempt = state.attempt(), text = %text, "extracted captcha text");
                        if let Some(last) = attempts.last_mut() {
                            last.text = text.clone();
                        }
                        Observation::TextRecovered(text)
                    }
                }
                Effect::Refresh => self.refresh(session),
                Effect::Submit(text) => self.submit(session, text),
                Effect::Verify => self.verify(session, state.attempt()),
            };

            if let Observation::Fault(msg) = &observation {
                tracing::warn!(attempt = state.attempt(), error = %msg, "captcha solving error");
            }

            let (next, next_effect) = transition(&state, observation, max_attempts);
            state = next;
            effect = next_effect;
        }

        match &state {
            SolveState::NoChallenge { attempt } => {
                tracing::info!(attempt, "captcha cleared");
            }
            SolveState::Exhausted { attempts: used } => {
                tracing::error!(attempts = used, "failed to solve captcha");
            }
            _ => {}
        }

        SolveReport {
            success: state.is_success(),
            attempts,
            final_state: state,
        }
    }

    fn abort_requested(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn detect<S: BrowserSession>(
        &self,
        session: &mut S,
        attempt: u32,
        capture: &mut Option<RgbImage>,
    ) -> Observation {
        let selector = &self.config.selectors.image;
        let element = match session.find_element(selector, self.config.detect_wait()) {
            Ok(Some(element)) => element,
            Ok(None) => {
                tracing::info!(attempt, "no captcha detected");
                return Observation::ChallengeAbsent;
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(attempt, "no captcha detected");
                return Observation::ChallengeAbsent;
            }
            Err(e) => return Observation::Fault(format!("challenge lookup failed: {}", e)),
        };

        match session.screenshot(&element) {
            Ok(img) => {
                if let Some(dir) = &self.config.capture_dir {
                    save_capture(dir, attempt, &img);
                }
                *capture = Some(img);
                Observation::ChallengeCaptured
            }
            Err(e) => Observation::Fault(format!("challenge screenshot failed: {}", e)),
        }
    }

    fn refresh<S: BrowserSession>(&self, session: &mut S) -> Observation {
        let selector = &self.config.selectors.refresh;
        match session.find_element(selector, Duration::ZERO) {
            Ok(Some(button)) => match session.click(&button) {
                Ok(()) => {
                    std::thread::sleep(self.config.refresh_settle());
                    Observation::Refreshed
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(%selector, "refresh control disappeared");
                    Observation::RefreshUnavailable
                }
                Err(e) => Observation::Fault(format!("refresh click failed: {}", e)),
            },
            Ok(None) => {
                tracing::warn!(%selector, "could not find captcha refresh button");
                Observation::RefreshUnavailable
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(%selector, "could not find captcha refresh button");
                Observation::RefreshUnavailable
            }
            Err(e) => Observation::Fault(format!("refresh lookup failed: {}", e)),
        }
    }

    fn submit<S: BrowserSession>(&self, session: &mut S, text: &str) -> Observation {
        let selectors = &self.config.selectors;

        let input = match session.find_element(&selectors.input, Duration::ZERO) {
            Ok(Some(input)) => input,
            Ok(None) => return missing_element("input", &selectors.input),
            Err(e) if e.is_not_found() => return missing_element("input", &selectors.input),
            Err(e) => return Observation::Fault(format!("input lookup failed: {}", e)),
        };
        if let Err(e) = session.clear(&input) {
            return Observation::Fault(format!("clearing input failed: {}", e));
        }
        if let Err(e) = session.type_text(&input, text) {
            return Observation::Fault(format!("typing into input failed: {}", e));
        }

        let button = match session.find_element(&selectors.submit, Duration::ZERO) {
            Ok(Some(button)) => button,
            Ok(None) => return missing_element("submit control", &selectors.submit),
            Err(e) if e.is_not_found() => {
                return missing_element("submit control", &selectors.submit);
            }
            Err(e) => return Observation::Fault(format!("submit lookup failed: {}", e)),
        };
        match session.click(&button) {
            Ok(()) => Observation::Submitted,
            Err(e) => Observation::Fault(format!("submit click failed: {}", e)),
        }
    }

    fn verify<S: BrowserSession>(&self, session: &mut S, attempt: u32) -> Observation {
        std::thread::sleep(self.config.submit_settle());

        match session.find_element(&self.config.selectors.input, Duration::ZERO) {
            Ok(Some(_)) => {
                tracing::warn!(attempt, "captcha solving failed, challenge still present");
                Observation::InputStillPresent
            }
            Ok(None) => Observation::InputGone,
            Err(e) if e.is_not_found() => Observation::InputGone,
            Err(e) => Observation::Fault(format!("verification lookup failed: {}", e)),
        }
    }
}

/// A control vanished mid-submit; this still costs the attempt.
fn missing_element(what: &str, selector: &Selector) -> Observation {
    Observation::Fault(format!("{} not found: {}", what, selector))
}

/// Saves a captured challenge as `<attempt>_<timestamp>.png`.
///
/// Failures are logged only; a dump never affects solving.
fn save_capture(dir: &Path, attempt: u32, img: &RgbImage) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to create capture directory");
        return;
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{:03}_{}.png", attempt, timestamp));
    match img.save(&path) {
        Ok(()) => tracing::debug!(path = %path.display(), "captcha saved"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save captcha"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChallengeSelectors, PipelineConfig};
    use crate::ocr::engine::testing::ScriptedRecognizer;
    use crate::solver::session::SessionError;
    use image::Rgb;
    use tempfile::tempdir;

    /// In-memory challenge page.
    struct FakePage {
        selectors: ChallengeSelectors,
        /// Whether the challenge widget is on the page
        challenge: bool,
        refresh_available: bool,
        /// The n-th submit (1-based) clears the challenge
        solve_on_submit: Option<usize>,
        /// Image lookups that fail with a driver error before behaving normally
        failing_lookups: usize,
        /// Report absent elements as `Err(NotFound)` instead of `Ok(None)`
        absent_as_error: bool,
        image: RgbImage,
        image_lookups: usize,
        submits: usize,
        refreshes: usize,
        typed: Vec<String>,
        clears: usize,
    }

    impl FakePage {
        fn new(challenge: bool) -> Self {
            Self {
                selectors: ChallengeSelectors::default(),
                challenge,
                refresh_available: true,
                solve_on_submit: None,
                failing_lookups: 0,
                absent_as_error: false,
                image: one_glyph(),
                image_lookups: 0,
                submits: 0,
                refreshes: 0,
                typed: Vec::new(),
                clears: 0,
            }
        }
    }

    impl BrowserSession for FakePage {
        type Element = Selector;

        fn find_element(
            &mut self,
            selector: &Selector,
            _wait: Duration,
        ) -> Result<Option<Selector>, SessionError> {
            if *selector == self.selectors.image {
                self.image_lookups += 1;
                if self.failing_lookups > 0 {
                    self.failing_lookups -= 1;
                    return Err(SessionError::Driver("connection reset".into()));
                }
            }
            let present = if *selector == self.selectors.refresh {
                self.challenge && self.refresh_available
            } else {
                self.challenge
            };
            if !present && self.absent_as_error {
                return Err(SessionError::NotFound(selector.to_string()));
            }
            Ok(present.then(|| selector.clone()))
        }

        fn screenshot(&mut self, _element: &Selector) -> Result<RgbImage, SessionError> {
            Ok(self.image.clone())
        }

        fn click(&mut self, element: &Selector) -> Result<(), SessionError> {
            if *element == self.selectors.submit {
                self.submits += 1;
                if self.solve_on_submit == Some(self.submits) {
                    self.challenge = false;
                }
            } else if *element == self.selectors.refresh {
                self.refreshes += 1;
            }
            Ok(())
        }

        fn clear(&mut self, _element: &Selector) -> Result<(), SessionError> {
            self.clears += 1;
            Ok(())
        }

        fn type_text(&mut self, _element: &Selector, text: &str) -> Result<(), SessionError> {
            self.typed.push(text.to_string());
            Ok(())
        }

        fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, SessionError> {
            Ok(serde_json::json!("complete"))
        }
    }

    fn one_glyph() -> RgbImage {
        RgbImage::from_fn(40, 20, |x, _| {
            if (10..20).contains(&x) {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn fast_config(max_attempts: u32) -> SolverConfig {
        SolverConfig {
            max_attempts,
            detect_wait_ms: 0,
            poll_interval_ms: 0,
            refresh_settle_ms: 0,
            submit_settle_ms: 0,
            page_ready_timeout_ms: 0,
            ..SolverConfig::default()
        }
    }

    fn solver(rec: &ScriptedRecognizer, max_attempts: u32) -> CaptchaSolver<&ScriptedRecognizer> {
        let pipeline = PipelineConfig {
            rotation_angles: vec![0.0],
            ..PipelineConfig::default()
        };
        let extractor = ImageTextExtractor::new(rec, pipeline).unwrap();
        CaptchaSolver::new(extractor, fast_config(max_attempts))
    }

    #[test]
    fn test_no_challenge_skips_recognition() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(false);

        assert!(solver(&rec, 5).solve(&mut page));
        assert_eq!(page.image_lookups, 1);
        assert_eq!(rec.call_count(), 0);
    }

    #[test]
    fn test_solved_on_first_attempt() {
        let rec = ScriptedRecognizer::new();
        rec.push(&[("Q", "90")]);
        let mut page = FakePage::new(true);
        page.solve_on_submit = Some(1);

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(page.typed, vec!["Q".to_string()]);
        assert_eq!(page.clears, 1);
        assert_eq!(
            report.attempts,
            vec![SolveAttempt { attempt: 1, text: "Q".into(), success: true }]
        );
    }

    #[test]
    fn test_retry_bound_is_exact() {
        let rec = ScriptedRecognizer::new();
        for _ in 0..10 {
            rec.push(&[("X", "80")]);
        }
        let mut page = FakePage::new(true);

        let report = solver(&rec, 3).solve_with_report(&mut page);

        assert!(!report.success);
        assert_eq!(report.final_state, SolveState::Exhausted { attempts: 3 });
        assert_eq!(page.image_lookups, 3);
        assert_eq!(page.submits, 3);
        assert_eq!(report.attempts.len(), 3);
    }

    #[test]
    fn test_solved_on_second_attempt() {
        let rec = ScriptedRecognizer::new();
        rec.push(&[("A", "50")]).push(&[("B", "60")]);
        let mut page = FakePage::new(true);
        page.solve_on_submit = Some(2);

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(page.typed, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.final_state, SolveState::NoChallenge { attempt: 2 });
        assert!(!report.attempts[0].success);
        assert!(report.attempts[1].success);
    }

    #[test]
    fn test_empty_read_refreshes_and_retries() {
        let rec = ScriptedRecognizer::new();
        rec.push(&[]).push(&[("Z", "70")]);
        let mut page = FakePage::new(true);
        page.solve_on_submit = Some(1);

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(page.refreshes, 1);
        assert_eq!(page.submits, 1);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].text, "");
    }

    #[test]
    fn test_empty_read_without_refresh_control_gives_up() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(true);
        page.refresh_available = false;

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(!report.success);
        assert_eq!(report.final_state, SolveState::Exhausted { attempts: 1 });
        assert_eq!(page.submits, 0);
    }

    #[test]
    fn test_empty_reads_never_exceed_budget() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(true);

        let report = solver(&rec, 3).solve_with_report(&mut page);

        assert!(!report.success);
        assert_eq!(page.image_lookups, 3);
        // No refresh after the last empty read
        assert_eq!(page.refreshes, 2);
        assert_eq!(page.submits, 0);
    }

    #[test]
    fn test_driver_fault_consumes_one_attempt() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(false);
        page.failing_lookups = 1;

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(page.image_lookups, 2);
        assert_eq!(report.final_state, SolveState::NoChallenge { attempt: 2 });
    }

    #[test]
    fn test_faults_on_every_attempt_exhaust() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(true);
        page.failing_lookups = usize::MAX;

        assert!(!solver(&rec, 4).solve(&mut page));
        assert_eq!(page.image_lookups, 4);
    }

    #[test]
    fn test_abort_flag_stops_before_detecting() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(true);
        let flag = Arc::new(AtomicBool::new(true));

        let solver = solver(&rec, 5).with_abort_flag(flag);
        let report = solver.solve_with_report(&mut page);

        assert!(!report.success);
        assert_eq!(page.image_lookups, 0);
        assert!(report.attempts.is_empty());
        assert_eq!(report.final_state, SolveState::Exhausted { attempts: 0 });
    }

    #[test]
    fn test_not_found_error_after_submit_is_solved() {
        let rec = ScriptedRecognizer::new();
        rec.push(&[("Q", "90")]);
        let mut page = FakePage::new(true);
        page.solve_on_submit = Some(1);
        page.absent_as_error = true;

        let report = solver(&rec, 1).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(report.final_state, SolveState::NoChallenge { attempt: 1 });
    }

    #[test]
    fn test_not_found_error_on_detect_is_no_challenge() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(false);
        page.absent_as_error = true;

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(report.success);
        assert_eq!(report.final_state, SolveState::NoChallenge { attempt: 1 });
        assert_eq!(rec.call_count(), 0);
    }

    #[test]
    fn test_not_found_refresh_control_gives_up() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(true);
        page.refresh_available = false;
        page.absent_as_error = true;

        let report = solver(&rec, 5).solve_with_report(&mut page);

        assert!(!report.success);
        assert_eq!(report.final_state, SolveState::Exhausted { attempts: 1 });
        assert_eq!(page.image_lookups, 1);
        assert_eq!(page.submits, 0);
    }

    #[test]
    fn test_zero_attempts_fails_without_touching_page() {
        let rec = ScriptedRecognizer::new();
        let mut page = FakePage::new(false);

        assert!(!solver(&rec, 0).solve(&mut page));
        assert_eq!(page.image_lookups, 0);
    }

    #[test]
    fn test_captures_are_saved() {
        let dir = tempdir().unwrap();
        let rec = ScriptedRecognizer::new();
        rec.push(&[("K", "88")]);
        let mut page = FakePage::new(true);
        page.solve_on_submit = Some(1);

        let pipeline = PipelineConfig {
            rotation_angles: vec![0.0],
            ..PipelineConfig::default()
        };
        let config = SolverConfig {
            capture_dir: Some(dir.path().join("captchas")),
            ..fast_config(5)
        };
        let solver = CaptchaSolver::new(ImageTextExtractor::new(&rec, pipeline).unwrap(), config);

        assert!(solver.solve(&mut page));

        let saved: Vec<_> = std::fs::read_dir(dir.path().join("captchas"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with("001_") && saved[0].ends_with(".png"));
    }
}
