//! Anti-bot challenge detection and the per-request recovery counter.
//!
//! When the upstream site interposes a security check, the peer relays the
//! interstitial HTML instead of framed tokens. The detector matches known
//! signatures against each raw chunk plus a short carried tail of the ones
//! before it; [`ChallengeState`] bounds how many refresh cycles a single
//! request may trigger.

/// Default interstitial signatures.
pub const DEFAULT_CHALLENGE_SIGNATURES: &[&str] = &[
    "Just a moment...",
    "Enable JavaScript and cookies to continue",
    "Checking your browser before accessing",
];

/// Matches raw peer output against configured challenge signatures.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    signatures: Vec<String>,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_SIGNATURES.iter().map(|s| s.to_string()))
    }
}

impl ChallengeDetector {
    pub fn new(signatures: impl IntoIterator<Item = String>) -> Self {
        Self {
            signatures: signatures.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// Returns the first signature present in `raw`, if any.
    pub fn detect<'a>(&'a self, raw: &str) -> Option<&'a str> {
        self.signatures
            .iter()
            .find(|sig| raw.contains(sig.as_str()))
            .map(String::as_str)
    }

    /// Scan one raw `chunk` as a continuation of `tail`.
    ///
    /// Afterwards `tail` holds only the last `longest signature - 1` bytes
    /// (rounded out to a char boundary), which is all a signature straddling
    /// the next chunk boundary can need.
    pub fn scan<'a>(&'a self, tail: &mut String, chunk: &str) -> Option<&'a str> {
        tail.push_str(chunk);
        let found = self.detect(tail);
        let keep = self.max_signature_len().saturating_sub(1);
        if tail.len() > keep {
            let mut cut = tail.len() - keep;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
        found
    }

    /// Byte length of the longest signature.
    pub fn max_signature_len(&self) -> usize {
        self.signatures.iter().map(String::len).max().unwrap_or(0)
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }
}

/// What to do after a challenge was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeDecision {
    /// Ask the peer to refresh; `attempt` is 1-based.
    Refresh { attempt: u32 },
    /// Budget exhausted; fail the request.
    Unresolved { attempts: u32 },
}

/// Per-correlation refresh counter, scoped to one peer connection epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeState {
    attempts: u32,
    epoch: u64,
}

impl ChallengeState {
    pub fn new(epoch: u64) -> Self {
        Self { attempts: 0, epoch }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Forget prior attempts if the peer connection changed since they were
    /// counted.
    pub fn observe_epoch(&mut self, epoch: u64) {
        if epoch != self.epoch {
            self.epoch = epoch;
            self.attempts = 0;
        }
    }

    /// Count one more detection and decide whether another refresh is allowed.
    pub fn register(&mut self, max_refresh_attempts: u32) -> ChallengeDecision {
        if self.attempts >= max_refresh_attempts {
            return ChallengeDecision::Unresolved {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        ChallengeDecision::Refresh {
            attempt: self.attempts,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_default_signatures() {
        let detector = ChallengeDetector::default();
        let page = "<html><title>Just a moment...</title></html>";
        assert_eq!(detector.detect(page), Some("Just a moment..."));
        assert_eq!(detector.detect(r#"a0:"hello""#), None);
    }

    #[test]
    fn empty_signatures_are_ignored() {
        let detector = ChallengeDetector::new(vec![String::new(), "captcha".to_string()]);
        assert_eq!(detector.signatures().len(), 1);
        assert_eq!(detector.detect("anything"), None);
        assert_eq!(detector.detect("a captcha page"), Some("captcha"));
    }

    #[test]
    fn scan_finds_signature_split_across_chunks() {
        let detector = ChallengeDetector::default();
        let mut tail = String::new();
        assert_eq!(detector.scan(&mut tail, "<html><title>Just a mo"), None);
        assert_eq!(detector.scan(&mut tail, "ment."), None);
        assert_eq!(detector.scan(&mut tail, "..</title>"), Some("Just a moment..."));
    }

    #[test]
    fn scan_keeps_tail_bounded() {
        let detector = ChallengeDetector::new(vec!["captcha".to_string()]);
        let mut tail = String::new();
        for _ in 0..100 {
            assert_eq!(detector.scan(&mut tail, r#"a0:"a long stretch of ordinary text""#), None);
            assert!(tail.len() <= detector.max_signature_len() - 1);
        }
        assert_eq!(tail, " text\"");
    }

    #[test]
    fn scan_cuts_on_char_boundaries() {
        let detector = ChallengeDetector::new(vec!["abcd".to_string()]);
        let mut tail = String::new();
        assert_eq!(detector.scan(&mut tail, "xxééé"), None);
        assert_eq!(tail, "é");
        assert_eq!(detector.scan(&mut tail, "abc"), None);
        assert_eq!(tail, "abc");
        assert_eq!(detector.scan(&mut tail, "d"), Some("abcd"));
    }

    #[test]
    fn refresh_budget_is_bounded() {
        let mut state = ChallengeState::new(1);
        assert_eq!(state.register(1), ChallengeDecision::Refresh { attempt: 1 });
        assert_eq!(state.register(1), ChallengeDecision::Unresolved { attempts: 1 });
        assert_eq!(state.attempts(), 1);
    }

    #[test]
    fn zero_budget_fails_immediately() {
        let mut state = ChallengeState::new(1);
        assert_eq!(state.register(0), ChallengeDecision::Unresolved { attempts: 0 });
    }

    #[test]
    fn epoch_change_resets_attempts() {
        let mut state = ChallengeState::new(1);
        state.register(1);
        state.observe_epoch(1);
        assert_eq!(state.attempts(), 1);
        state.observe_epoch(2);
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.epoch(), 2);
        assert_eq!(state.register(1), ChallengeDecision::Refresh { attempt: 1 });
    }
}
