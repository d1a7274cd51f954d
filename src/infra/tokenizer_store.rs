// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads a pretrained HuggingFace `tokenizer.json` and turns text
// into fixed-length id/mask pairs:
//
//   [CLS] tok tok tok ... [SEP] [PAD] [PAD]
//     1    1   1   1  ...   1     0     0      ← attention mask
//
// Content longer than max_len − 2 tokens is cut before [SEP] is
// appended, so every sequence still ends with [SEP]. Special
// tokens are added here rather than by the tokenizer's own
// post-processor so any vocabulary with [CLS]/[SEP] entries works.

use anyhow::{anyhow, Result};
use std::path::Path;
use tokenizers::Tokenizer;

use crate::domain::traits::TextEncoding;

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const PAD: &str = "[PAD]";

pub struct TokenizerStore {
    tokenizer: Tokenizer,
    cls_id:    u32,
    sep_id:    u32,
    pad_id:    u32,
}

impl TokenizerStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;
        let store = Self::from_tokenizer(tokenizer)?;
        tracing::info!(
            "Tokenizer loaded from '{}' (vocab size {})",
            path.display(),
            store.vocab_size()
        );
        Ok(store)
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Result<Self> {
        let id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| anyhow!("Tokenizer vocabulary has no '{token}' token"))
        };
        let cls_id = id(CLS)?;
        let sep_id = id(SEP)?;
        // Padding positions are masked out, so their id only has to be in range.
        let pad_id = tokenizer.token_to_id(PAD).unwrap_or(0);
        Ok(Self { tokenizer, cls_id, sep_id, pad_id })
    }
}

impl TextEncoding for TokenizerStore {
    fn encode(&self, text: &str, max_len: usize) -> Result<(Vec<u32>, Vec<u32>)> {
        if max_len < 2 {
            return Err(anyhow!("max_len {max_len} leaves no room for [CLS] and [SEP]"));
        }
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenisation failed: {e}"))?;

        let mut ids = Vec::with_capacity(max_len);
        ids.push(self.cls_id);
        ids.extend(encoding.get_ids().iter().take(max_len - 2));
        ids.push(self.sep_id);

        let mut mask = vec![1u32; ids.len()];
        ids.resize(max_len, self.pad_id);
        mask.resize(max_len, 0);
        Ok((ids, mask))
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A word-level tokenizer in HuggingFace JSON format.
    fn word_level(dir: &Path) -> TokenizerStore {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
                    "we": 4, "propose": 5, "a": 6, "method": 7
                },
                "unk_token": "[UNK]"
            }
        });
        let path = dir.join("tokenizer.json");
        std::fs::write(&path, json.to_string()).unwrap();
        TokenizerStore::load(&path).unwrap()
    }

    #[test]
    fn test_wraps_and_pads() {
        let dir   = TempDir::new().unwrap();
        let store = word_level(dir.path());
        let (ids, mask) = store.encode("we propose", 6).unwrap();
        assert_eq!(ids,  vec![2, 4, 5, 3, 0, 0]);
        assert_eq!(mask, vec![1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_truncation_keeps_sep() {
        let dir   = TempDir::new().unwrap();
        let store = word_level(dir.path());
        let (ids, mask) = store.encode("we propose a method", 4).unwrap();
        assert_eq!(ids,  vec![2, 4, 5, 3]);
        assert_eq!(mask, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let dir   = TempDir::new().unwrap();
        let store = word_level(dir.path());
        let (ids, _) = store.encode("we zebra", 5).unwrap();
        assert_eq!(ids, vec![2, 4, 1, 3, 0]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(TokenizerStore::load(dir.path().join("absent.json")).is_err());
    }
}
