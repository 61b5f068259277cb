//! The character-recognition capability consumed by the pipeline.
//!
//! The pipeline only depends on the [`Recognizer`] trait, so any OCR backend
//! (or a scripted test double) can be plugged in.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Result;
use image::RgbImage;
use thiserror::Error;

/// Uppercase Latin letters, the default recognition alphabet.
pub const DEFAULT_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhitelistError {
    #[error("whitelist is empty")]
    Empty,
    #[error("whitelist contains unusable symbol {0:?}")]
    InvalidSymbol(char),
}

/// The set of symbols the recognizer may emit.
///
/// Symbols are kept in first-seen order; duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    symbols: String,
}

impl Whitelist {
    pub fn new(symbols: &str) -> Result<Self, WhitelistError> {
        let mut seen = BTreeSet::new();
        let mut kept = String::new();

        for c in symbols.chars() {
            if c.is_whitespace() || c.is_control() {
                return Err(WhitelistError::InvalidSymbol(c));
            }
            if seen.insert(c) {
                kept.push(c);
            }
        }

        if kept.is_empty() {
            return Err(WhitelistError::Empty);
        }

        Ok(Self { symbols: kept })
    }

    pub fn as_str(&self) -> &str {
        &self.symbols
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_WHITELIST.to_string(),
        }
    }
}

impl fmt::Display for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbols)
    }
}

/// How the engine should interpret the layout of the input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// A single uniform block of text.
    SingleBlock,
    /// A single text line.
    SingleLine,
    /// One isolated character.
    SingleCharacter,
}

impl PageSegMode {
    /// Tesseract `--psm` value.
    pub fn as_psm(self) -> u8 {
        match self {
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SingleCharacter => 10,
        }
    }
}

/// One fragment exactly as the engine reported it.
///
/// Confidence is left string-encoded; engines emit values like `"-1"` or
/// `"91.48"` and the caller decides what parses.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub text: String,
    pub confidence: String,
}

impl RawCandidate {
    pub fn new(text: impl Into<String>, confidence: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.into(),
        }
    }

    /// Trims the text and parses the confidence.
    ///
    /// Returns `None` for blank text or a confidence that is not a number.
    pub fn parse(&self) -> Option<RecognitionCandidate> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let confidence: f32 = self.confidence.trim().parse().ok()?;
        if confidence.is_nan() {
            return None;
        }
        Some(RecognitionCandidate {
            text: text.to_string(),
            confidence,
        })
    }
}

/// A usable reading: non-blank text with a numeric confidence (usually 0-100).
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionCandidate {
    pub text: String,
    pub confidence: f32,
}

/// External character-recognition capability.
pub trait Recognizer {
    /// Recognizes text in `image`, restricted to `whitelist`.
    ///
    /// Returns fragments in engine order. An `Err` means the engine itself
    /// failed; an empty vector means it ran and saw nothing.
    fn recognize(
        &self,
        image: &RgbImage,
        whitelist: &Whitelist,
        mode: PageSegMode,
    ) -> Result<Vec<RawCandidate>>;
}

impl<R: Recognizer + ?Sized> Recognizer for &R {
    fn recognize(
        &self,
        image: &RgbImage,
        whitelist: &Whitelist,
        mode: PageSegMode,
    ) -> Result<Vec<RawCandidate>> {
        (**self).recognize(image, whitelist, mode)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(
        &self,
        image: &RgbImage,
        whitelist: &Whitelist,
        mode: PageSegMode,
    ) -> Result<Vec<RawCandidate>> {
        (**self).recognize(image, whitelist, mode)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted recognizer shared by pipeline tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Answers each call with the next queued response.
    ///
    /// Once the script runs out every call returns an empty list.
    #[derive(Default)]
    pub struct ScriptedRecognizer {
        responses: RefCell<VecDeque<Result<Vec<RawCandidate>, String>>>,
        pub calls: RefCell<Vec<(u32, u32)>>,
    }

    impl ScriptedRecognizer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, candidates: &[(&str, &str)]) -> &Self {
            self.responses.borrow_mut().push_back(Ok(candidates
                .iter()
                .map(|(t, c)| RawCandidate::new(*t, *c))
                .collect()));
            self
        }

        pub fn push_error(&self, message: &str) -> &Self {
            self.responses
                .borrow_mut()
                .push_back(Err(message.to_string()));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize(
            &self,
            image: &RgbImage,
            _whitelist: &Whitelist,
            _mode: PageSegMode,
        ) -> Result<Vec<RawCandidate>> {
            self.calls.borrow_mut().push(image.dimensions());
            match self.responses.borrow_mut().pop_front() {
                Some(Ok(candidates)) => Ok(candidates),
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Ok(Vec::new()),
            }
        }
    }
}
