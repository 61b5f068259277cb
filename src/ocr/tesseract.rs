use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::engine::{PageSegMode, RawCandidate, Recognizer, Whitelist};

/// Recognizer backed by the `tesseract` command-line program.
///
/// Each call writes the image to a temporary PNG and asks Tesseract for TSV
/// output, which carries a confidence for every reported fragment.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    pub executable: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// OCR engine mode (`--oem`); 3 lets Tesseract pick its most accurate engine.
    pub engine_mode: u8,
}

impl TesseractCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            tessdata_dir: None,
            language: "eng".to_string(),
            engine_mode: 3,
        }
    }

    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_engine_mode(mut self, engine_mode: u8) -> Self {
        self.engine_mode = engine_mode;
        self
    }

    /// Builds the argument list that follows the input and output paths.
    fn build_args(&self, whitelist: &Whitelist, mode: PageSegMode) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string_lossy().to_string());
        }
        args.push("-l".to_string());
        args.push(self.language.clone());
        args.push("--psm".to_string());
        args.push(mode.as_psm().to_string());
        args.push("--oem".to_string());
        args.push(self.engine_mode.to_string());
        args.push("-c".to_string());
        args.push(format!("tessedit_char_whitelist={}", whitelist));
        // Config file name, must come last
        args.push("tsv".to_string());
        args
    }
}

impl Recognizer for TesseractCli {
    fn recognize(
        &self,
        image: &RgbImage,
        whitelist: &Whitelist,
        mode: PageSegMode,
    ) -> Result<Vec<RawCandidate>> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image
            .save(temp_input.path())
            .context("failed to write temporary image for Tesseract")?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .args(self.build_args(whitelist, mode))
            .output()
            .with_context(|| format!("failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

/// Parses Tesseract TSV output into raw `(text, conf)` pairs in row order.
///
/// Every data row is reported, including structural rows with empty text and a
/// `-1` confidence; the caller decides which ones count.
pub fn parse_tsv_output(tsv: &str) -> Vec<RawCandidate> {
    let mut candidates = Vec::new();

    // Skip header
    for line in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            continue;
        }

        let confidence = fields[10];
        let text = fields.get(11).copied().unwrap_or("");
        candidates.push(RawCandidate::new(text, confidence));
    }

    candidates
}
