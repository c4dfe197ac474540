use super::phonemizer::PhonemeClause;

/// Groups phonemizer clauses into sentence-level phoneme strings.
///
/// Clause terminators (comma, colon, semicolon) stay inside the current
/// sentence as punctuation. Sentence terminators close it.
#[derive(Debug, Default)]
pub struct ClauseSegmenter {
    sentences: Vec<String>,
    current: String,
}

impl ClauseSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: &PhonemeClause) {
        self.current.push_str(&clause.phonemes);
        self.current.push_str(clause.terminator.punctuation());

        if clause.terminator.is_sentence_boundary() {
            self.close_sentence();
        }
    }

    /// Close any trailing group and return the non-empty sentences.
    pub fn finish(mut self) -> Vec<String> {
        self.close_sentence();
        self.sentences
    }

    fn close_sentence(&mut self) {
        let sentence = std::mem::take(&mut self.current);
        if !sentence.trim().is_empty() {
            self.sentences.push(sentence);
        }
    }
}

/// Segment a full clause stream in one call.
pub fn segment<'a, I>(clauses: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a PhonemeClause>,
{
    let mut segmenter = ClauseSegmenter::new();
    for clause in clauses {
        segmenter.push(clause);
    }
    segmenter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::piper::phonemizer::ClauseTerminator;

    fn clause(phonemes: &str, terminator: ClauseTerminator) -> PhonemeClause {
        PhonemeClause::new(phonemes, terminator)
    }

    #[test]
    fn sentence_terminators_start_new_groups() {
        let clauses = [
            clause("həlˈoʊ", ClauseTerminator::FullStop),
            clause("haʊ ɑːɹ juː", ClauseTerminator::Question),
            clause("ɡɹˈeɪt", ClauseTerminator::Exclamation),
        ];
        assert_eq!(
            segment(&clauses),
            vec!["həlˈoʊ.", "haʊ ɑːɹ juː?", "ɡɹˈeɪt!"]
        );
    }

    #[test]
    fn clause_terminators_stay_in_current_group() {
        let clauses = [
            clause("wʌn", ClauseTerminator::Comma),
            clause("tuː", ClauseTerminator::Colon),
            clause("θɹiː", ClauseTerminator::Semicolon),
            clause("fɔːɹ", ClauseTerminator::FullStop),
        ];
        assert_eq!(segment(&clauses), vec!["wʌn, tuː: θɹiː; fɔːɹ."]);
    }

    #[test]
    fn trailing_text_without_terminator_is_kept() {
        let clauses = [
            clause("wʌn", ClauseTerminator::FullStop),
            clause("tuː", ClauseTerminator::None),
        ];
        assert_eq!(segment(&clauses), vec!["wʌn.", "tuː"]);
    }

    #[test]
    fn empty_groups_are_dropped() {
        let clauses = [
            clause("wʌn", ClauseTerminator::FullStop),
            clause("", ClauseTerminator::None),
            clause("  ", ClauseTerminator::None),
        ];
        assert_eq!(segment(&clauses), vec!["wʌn."]);
        assert!(segment(&Vec::<PhonemeClause>::new()).is_empty());
    }

    #[test]
    fn bare_terminator_still_forms_a_sentence() {
        // Punctuation carries ids of its own in Piper vocabularies.
        let clauses = [clause("", ClauseTerminator::FullStop)];
        assert_eq!(segment(&clauses), vec!["."]);
    }
}
