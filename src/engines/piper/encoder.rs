use super::manifest::PhonemeIdMap;
use super::model::PiperError;

/// Padding token, emitted after every phoneme id.
pub const ID_PAD: i64 = 0;
/// Beginning-of-sentence token.
pub const ID_BOS: i64 = 1;
/// End-of-sentence token.
pub const ID_EOS: i64 = 2;

/// Extra `PAD` ids inserted between sentences as a pause.
pub const SENTENCE_GAP_PADS: usize = 8;

/// Encode sentences into one flattened id sequence for a single inference call.
///
/// Per sentence: `BOS, PAD`, then `id, PAD` for every mapped id, then `EOS`.
/// Sentences are separated by [`SENTENCE_GAP_PADS`] pads. Code points missing
/// from `map` are skipped, as are `(xx)` language-switch markers.
///
/// Fails with [`PiperError::NoPhonemesProduced`] if no phoneme mapped.
pub fn encode<S: AsRef<str>>(sentences: &[S], map: &PhonemeIdMap) -> Result<Vec<i64>, PiperError> {
    let mut ids = Vec::new();
    let mut mapped = 0usize;

    for sentence in sentences {
        let sentence = sentence.as_ref();
        if sentence.is_empty() {
            continue;
        }

        if !ids.is_empty() {
            ids.extend(std::iter::repeat(ID_PAD).take(SENTENCE_GAP_PADS));
        }

        ids.push(ID_BOS);
        ids.push(ID_PAD);
        mapped += encode_sentence(sentence, map, &mut ids);
        ids.push(ID_EOS);
    }

    if mapped == 0 {
        return Err(PiperError::NoPhonemesProduced);
    }

    log::debug!("Encoded {} ids: {}", ids.len(), preview(&ids, 20));
    Ok(ids)
}

/// Returns how many phoneme ids were emitted.
fn encode_sentence(sentence: &str, map: &PhonemeIdMap, ids: &mut Vec<i64>) -> usize {
    let mut mapped = 0;
    let mut in_lang_flag = false;

    for phoneme in sentence.chars() {
        if in_lang_flag {
            if phoneme == ')' {
                in_lang_flag = false;
            }
            continue;
        }
        if phoneme == '(' {
            in_lang_flag = true;
            continue;
        }

        match map.get(&phoneme) {
            Some(phoneme_ids) => {
                for &id in phoneme_ids {
                    ids.push(id);
                    ids.push(ID_PAD);
                    mapped += 1;
                }
            }
            None => log::debug!("Unknown phoneme U+{:04X} {phoneme:?}", phoneme as u32),
        }
    }

    mapped
}

fn preview(ids: &[i64], limit: usize) -> String {
    let mut out = ids
        .iter()
        .take(limit)
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    if ids.len() > limit {
        out.push_str("...");
    }
    out
}
