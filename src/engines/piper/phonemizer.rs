use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::PiperError;

// libespeak-ng clause terminator bit fields.
const CLAUSE_INTONATION_FULL_STOP: u32 = 0x0000_0000;
const CLAUSE_INTONATION_COMMA: u32 = 0x0000_1000;
const CLAUSE_INTONATION_QUESTION: u32 = 0x0000_2000;
const CLAUSE_INTONATION_EXCLAMATION: u32 = 0x0000_3000;
const CLAUSE_TYPE_CLAUSE: u32 = 0x0004_0000;
const CLAUSE_TYPE_SENTENCE: u32 = 0x0008_0000;
const CLAUSE_MASK: u32 = 0x000F_FFFF;

const CLAUSE_PERIOD: u32 = 40 | CLAUSE_INTONATION_FULL_STOP | CLAUSE_TYPE_SENTENCE;
const CLAUSE_COMMA: u32 = 20 | CLAUSE_INTONATION_COMMA | CLAUSE_TYPE_CLAUSE;
const CLAUSE_QUESTION: u32 = 40 | CLAUSE_INTONATION_QUESTION | CLAUSE_TYPE_SENTENCE;
const CLAUSE_EXCLAMATION: u32 = 45 | CLAUSE_INTONATION_EXCLAMATION | CLAUSE_TYPE_SENTENCE;
const CLAUSE_COLON: u32 = 30 | CLAUSE_INTONATION_FULL_STOP | CLAUSE_TYPE_CLAUSE;
const CLAUSE_SEMICOLON: u32 = 30 | CLAUSE_INTONATION_COMMA | CLAUSE_TYPE_CLAUSE;

/// How a phonemized clause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseTerminator {
    FullStop,
    Question,
    Exclamation,
    Comma,
    Colon,
    Semicolon,
    /// Input ended without punctuation.
    None,
}

impl ClauseTerminator {
    /// Whether this terminator closes a sentence group.
    pub fn is_sentence_boundary(self) -> bool {
        matches!(
            self,
            ClauseTerminator::FullStop | ClauseTerminator::Question | ClauseTerminator::Exclamation
        )
    }

    /// Punctuation appended to the phoneme text of the clause.
    pub fn punctuation(self) -> &'static str {
        match self {
            ClauseTerminator::FullStop => ".",
            ClauseTerminator::Question => "?",
            ClauseTerminator::Exclamation => "!",
            ClauseTerminator::Comma => ", ",
            ClauseTerminator::Colon => ": ",
            ClauseTerminator::Semicolon => "; ",
            ClauseTerminator::None => "",
        }
    }

    /// Pause after the clause, in units of 10 ms.
    pub fn pause_weight(self) -> u32 {
        match self {
            ClauseTerminator::FullStop | ClauseTerminator::Question => 40,
            ClauseTerminator::Exclamation => 45,
            ClauseTerminator::Comma => 20,
            ClauseTerminator::Colon | ClauseTerminator::Semicolon => 30,
            ClauseTerminator::None => 0,
        }
    }

    /// Decode the terminator reported by `espeak_TextToPhonemesWithTerminator`.
    pub fn from_espeak_code(code: u32) -> Self {
        match code & CLAUSE_MASK {
            CLAUSE_PERIOD => ClauseTerminator::FullStop,
            CLAUSE_QUESTION => ClauseTerminator::Question,
            CLAUSE_EXCLAMATION => ClauseTerminator::Exclamation,
            CLAUSE_COMMA => ClauseTerminator::Comma,
            CLAUSE_COLON => ClauseTerminator::Colon,
            CLAUSE_SEMICOLON => ClauseTerminator::Semicolon,
            _ => ClauseTerminator::None,
        }
    }

    fn from_punctuation(ch: char) -> Option<Self> {
        match ch {
            '.' => Some(ClauseTerminator::FullStop),
            '?' => Some(ClauseTerminator::Question),
            '!' => Some(ClauseTerminator::Exclamation),
            ',' => Some(ClauseTerminator::Comma),
            ':' => Some(ClauseTerminator::Colon),
            ';' => Some(ClauseTerminator::Semicolon),
            _ => None,
        }
    }
}

/// Phoneme text for one clause and the terminator that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeClause {
    pub phonemes: String,
    pub terminator: ClauseTerminator,
}

impl PhonemeClause {
    pub fn new(phonemes: impl Into<String>, terminator: ClauseTerminator) -> Self {
        Self {
            phonemes: phonemes.into(),
            terminator,
        }
    }
}

/// Text → IPA-like phoneme clauses.
pub trait Phonemizer: Send + Sync {
    /// `voice` is the manifest's phonemizer voice id (e.g. `"en-us"`).
    fn phonemize(&self, text: &str, voice: &str) -> Result<Vec<PhonemeClause>, PiperError>;
}

/// Location of the espeak-ng binary and its data directory.
///
/// `None` falls back to `espeak-ng` on PATH and its compiled-in data path.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

/// [`Phonemizer`] backed by the `espeak-ng` command line tool.
#[derive(Debug, Clone, Default)]
pub struct EspeakPhonemizer {
    config: EspeakConfig,
}

impl EspeakPhonemizer {
    pub fn new(config: EspeakConfig) -> Self {
        Self { config }
    }

    fn run_espeak(&self, input: &str, voice: &str) -> Result<String, PiperError> {
        let bin = self
            .config
            .bin_path
            .as_deref()
            .map(|p| p.as_os_str())
            .unwrap_or_else(|| OsStr::new("espeak-ng"));

        let mut command = Command::new(bin);
        command.args(["--ipa", "--stdin", "-q", "-v", voice]);
        if let Some(data) = &self.config.data_path {
            let mut arg = OsString::from("--path=");
            arg.push(data.as_os_str());
            command.arg(arg);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PiperError::EspeakNotFound
                } else {
                    PiperError::Io(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // espeak-ng reads stdin line by line; an unterminated last line
            // loses its final phoneme.
            let payload = canonicalize_espeak_stdin_payload(input);
            stdin.write_all(payload.as_bytes())?;
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PiperError::PhonemizerFailed(format!(
                "espeak-ng exited with code {:?}: {stderr}",
                output.status.code()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn phonemize_segments_batch(
        &self,
        segments: &[&str],
        voice: &str,
    ) -> Result<Vec<String>, PiperError> {
        let output = self.run_espeak(&segments.join("\n"), voice)?;
        let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();

        if lines.len() != segments.len() {
            log::debug!(
                "espeak-ng returned {} lines for {} segments, phonemizing one at a time",
                lines.len(),
                segments.len()
            );
            return segments
                .iter()
                .map(|segment| Ok(clean_ipa(&self.run_espeak(segment, voice)?)))
                .collect();
        }

        Ok(lines.iter().map(|line| clean_ipa(line)).collect())
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn phonemize(&self, text: &str, voice: &str) -> Result<Vec<PhonemeClause>, PiperError> {
        let parts = split_text_parts(text);
        let text_segments: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                TextPart::Text(segment) => Some(segment.as_str()),
                TextPart::Terminator(_) => None,
            })
            .collect();

        if text_segments.is_empty() {
            return Ok(Vec::new());
        }

        let mut phonemes = self.phonemize_segments_batch(&text_segments, voice)?.into_iter();
        let mut clauses = Vec::new();
        let mut pending = String::new();

        for part in parts {
            match part {
                TextPart::Text(_) => {
                    if let Some(segment) = phonemes.next() {
                        if !pending.is_empty() && !segment.is_empty() {
                            pending.push(' ');
                        }
                        pending.push_str(&segment);
                    }
                }
                TextPart::Terminator(terminator) => {
                    clauses.push(PhonemeClause::new(std::mem::take(&mut pending), terminator));
                }
            }
        }

        if !pending.is_empty() {
            clauses.push(PhonemeClause::new(pending, ClauseTerminator::None));
        }

        Ok(clauses)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Terminator(ClauseTerminator),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        let ch_len = ch.len_utf8();
        if let Some(terminator) = map_boundary_punctuation(ch) {
            if !is_numeric_connector_between_digits(text, idx, ch_len, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Terminator(terminator));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

fn map_boundary_punctuation(ch: char) -> Option<ClauseTerminator> {
    match ch {
        '\n' | '\r' => Some(ClauseTerminator::FullStop),
        _ => ClauseTerminator::from_punctuation(ch),
    }
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn canonicalize_espeak_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Join espeak-ng output lines and drop its `_` separators.
fn clean_ipa(ipa: &str) -> String {
    ipa.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|&ch| ch != '_')
        .collect()
}

const LOCALE_TO_ESPEAK: &[(&str, &str)] = &[
    ("en_us", "en-us"),
    ("en_gb", "en-gb"),
    ("en_au", "en-au"),
    ("en_ca", "en-ca"),
    ("en_in", "en-in"),
    ("en_ie", "en-ie"),
    ("en_za", "en-za"),
    ("en_nz", "en-nz"),
    ("es_es", "es"),
    ("es_mx", "es-mx"),
    ("es_ar", "es-ar"),
    ("es_co", "es-co"),
    ("fr_fr", "fr"),
    ("fr_ca", "fr-ca"),
    ("fr_be", "fr-be"),
    ("fr_ch", "fr-ch"),
    ("it_it", "it"),
    ("pt_br", "pt-br"),
    ("pt_pt", "pt"),
    ("ca_es", "ca"),
    ("ro_ro", "ro"),
    ("de_de", "de"),
    ("de_at", "de-at"),
    ("de_ch", "de-ch"),
    ("nl_nl", "nl"),
    ("nl_be", "nl-be"),
    ("da_dk", "da"),
    ("sv_se", "sv"),
    ("nb_no", "no"),
    ("nn_no", "no"),
    ("is_is", "is"),
    ("af_za", "af"),
    ("ru_ru", "ru"),
    ("pl_pl", "pl"),
    ("cs_cz", "cs"),
    ("sk_sk", "sk"),
    ("uk_ua", "uk"),
    ("bg_bg", "bg"),
    ("hr_hr", "hr"),
    ("sr_rs", "sr"),
    ("sl_si", "sl"),
    ("mk_mk", "mk"),
    ("bs_ba", "bs"),
    ("fi_fi", "fi"),
    ("et_ee", "et"),
    ("lv_lv", "lv"),
    ("lt_lt", "lt"),
    ("hu_hu", "hu"),
    ("el_gr", "el"),
    ("tr_tr", "tr"),
    ("mt_mt", "mt"),
    ("ga_ie", "ga"),
    ("cy_gb", "cy"),
    ("eu_es", "eu"),
    ("gl_es", "gl"),
    ("zh_cn", "zh"),
    ("zh_tw", "zh-tw"),
    ("zh_hk", "zh-hk"),
    ("ja_jp", "ja"),
    ("ko_kr", "ko"),
    ("hi_in", "hi"),
    ("bn_in", "bn"),
    ("ta_in", "ta"),
    ("te_in", "te"),
    ("mr_in", "mr"),
    ("gu_in", "gu"),
    ("kn_in", "kn"),
    ("ml_in", "ml"),
    ("pa_in", "pa"),
    ("ne_np", "ne"),
    ("si_lk", "si"),
    ("my_mm", "my"),
    ("th_th", "th"),
    ("vi_vn", "vi"),
    ("id_id", "id"),
    ("ms_my", "ms"),
    ("ar_sa", "ar"),
    ("ar_jo", "ar"),
    ("he_il", "he"),
    ("fa_ir", "fa"),
    ("ur_pk", "ur"),
    ("sw_ke", "sw"),
    ("sw_cd", "sw"),
    ("am_et", "am"),
    ("ka_ge", "ka"),
    ("kk_kz", "kk"),
    ("eo", "eo"),
    ("ia", "ia"),
];

/// Map a locale (`en_US`, `en-gb`, `de`) to an espeak-ng voice id.
///
/// Tries the full locale, then the language alone, then `en-us`.
pub fn espeak_voice_for_locale(locale: &str) -> &'static str {
    let normalized = locale.trim().to_ascii_lowercase().replace('-', "_");
    let lookup = |key: &str| {
        LOCALE_TO_ESPEAK
            .iter()
            .find(|(loc, _)| *loc == key)
            .map(|(_, voice)| *voice)
    };

    if let Some(voice) = lookup(&normalized) {
        return voice;
    }

    let language = normalized.split('_').next().unwrap_or("");
    lookup(language)
        .or_else(|| {
            // Language-only input such as "de": take the first locale of that language.
            LOCALE_TO_ESPEAK
                .iter()
                .find(|(loc, _)| loc.split('_').next() == Some(language))
                .map(|(_, voice)| *voice)
        })
        .unwrap_or("en-us")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn espeak_available() -> bool {
        Command::new("espeak-ng").arg("--version").output().is_ok()
    }

    #[test]
    fn splits_text_and_terminators() {
        let parts = split_text_parts("Hello, world. Testing!");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Hello".to_string()),
                TextPart::Terminator(ClauseTerminator::Comma),
                TextPart::Text("world".to_string()),
                TextPart::Terminator(ClauseTerminator::FullStop),
                TextPart::Text("Testing".to_string()),
                TextPart::Terminator(ClauseTerminator::Exclamation),
            ]
        );
    }

    #[test]
    fn keeps_decimal_and_thousands_separators_inside_text() {
        let parts = split_text_parts("Version 2.0 reached 1,000 users.");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Version 2.0 reached 1,000 users".to_string()),
                TextPart::Terminator(ClauseTerminator::FullStop),
            ]
        );
    }

    #[test]
    fn newlines_end_sentences() {
        let parts = split_text_parts("first line\nsecond line");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("first line".to_string()),
                TextPart::Terminator(ClauseTerminator::FullStop),
                TextPart::Text("second line".to_string()),
            ]
        );
    }

    #[test]
    fn appends_trailing_newline_for_espeak_stdin() {
        assert_eq!(canonicalize_espeak_stdin_payload("America"), "America\n");
        assert_eq!(canonicalize_espeak_stdin_payload("America\n"), "America\n");
    }

    #[test]
    fn clean_ipa_strips_separators() {
        assert_eq!(clean_ipa(" həlˈoʊ_ wˈɜːld\n"), "həlˈoʊ wˈɜːld");
    }

    #[test]
    fn decodes_espeak_terminator_codes() {
        assert_eq!(
            ClauseTerminator::from_espeak_code(CLAUSE_PERIOD),
            ClauseTerminator::FullStop
        );
        assert_eq!(
            ClauseTerminator::from_espeak_code(CLAUSE_QUESTION | 0x0100_0000),
            ClauseTerminator::Question
        );
        assert_eq!(
            ClauseTerminator::from_espeak_code(CLAUSE_SEMICOLON),
            ClauseTerminator::Semicolon
        );
        assert_eq!(ClauseTerminator::from_espeak_code(0), ClauseTerminator::None);
        assert!(ClauseTerminator::Exclamation.is_sentence_boundary());
        assert!(!ClauseTerminator::Colon.is_sentence_boundary());
        assert_eq!(ClauseTerminator::Exclamation.pause_weight(), 45);
    }

    #[test]
    fn maps_locales_to_espeak_voices() {
        assert_eq!(espeak_voice_for_locale("en_US"), "en-us");
        assert_eq!(espeak_voice_for_locale("en-GB"), "en-gb");
        assert_eq!(espeak_voice_for_locale("pt_BR"), "pt-br");
        assert_eq!(espeak_voice_for_locale("de_LU"), "de");
        assert_eq!(espeak_voice_for_locale("eo"), "eo");
        assert_eq!(espeak_voice_for_locale("xx_YY"), "en-us");
    }

    #[test]
    fn espeak_produces_clauses_per_punctuation() {
        if !espeak_available() {
            return;
        }

        let clauses = EspeakPhonemizer::default()
            .phonemize("Hello, world. How are you", "en-us")
            .expect("espeak should succeed");
        let terminators: Vec<_> = clauses.iter().map(|c| c.terminator).collect();
        assert_eq!(
            terminators,
            vec![
                ClauseTerminator::Comma,
                ClauseTerminator::FullStop,
                ClauseTerminator::None
            ]
        );
        assert!(clauses.iter().all(|c| !c.phonemes.is_empty()));
    }

    #[test]
    fn espeak_keeps_terminal_schwa_for_america() {
        if !espeak_available() {
            return;
        }

        let clauses = EspeakPhonemizer::default()
            .phonemize("America", "en-us")
            .expect("espeak should succeed");
        assert_eq!(clauses.len(), 1);
        assert!(
            clauses[0].phonemes.ends_with('ə'),
            "terminal schwa should be preserved: {:?}",
            clauses[0].phonemes
        );
    }
}
