//! Token counting using tiktoken-rs.
//!
//! Uses cl100k_base encoding. Chunk sizes, overlaps and the prompt budget are
//! all measured with this encoding.

use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

lazy_static! {
    /// Shared encoder. `None` if the bundled ranks failed to load, in which
    /// case every function here falls back to the 4-chars-per-token estimate.
    static ref BPE: Option<Mutex<CoreBPE>> = match cl100k_base() {
        Ok(bpe) => Some(Mutex::new(bpe)),
        Err(e) => {
            warn!(error = %e, "cl100k_base unavailable, using estimated token counts");
            None
        }
    };
}

/// Global token cache to avoid recounting identical content
static TOKEN_CACHE: RwLock<Option<TokenCache>> = RwLock::new(None);

/// Cache for token counts, keyed by content hash
pub struct TokenCache {
    cache: HashMap<u64, u32>,
    max_size: usize,
}

impl TokenCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size),
            max_size,
        }
    }

    pub fn get(&self, hash: u64) -> Option<u32> {
        self.cache.get(&hash).copied()
    }

    pub fn insert(&mut self, hash: u64, count: u32) {
        // At capacity: drop half the entries
        if self.cache.len() >= self.max_size {
            let keys_to_remove: Vec<_> = self.cache.keys().take(self.max_size / 2).copied().collect();
            for key in keys_to_remove {
                self.cache.remove(&key);
            }
        }
        self.cache.insert(hash, count);
    }
}

fn ensure_cache_initialized() {
    let mut cache = TOKEN_CACHE.write();
    if cache.is_none() {
        *cache = Some(TokenCache::new(10_000));
    }
}

fn hash_content(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Count tokens in text using cl100k_base encoding.
///
/// Results are cached by content hash; the splitter counts the same
/// sentences many times while merging.
pub fn count_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    ensure_cache_initialized();
    let content_hash = hash_content(text);

    {
        let cache = TOKEN_CACHE.read();
        if let Some(ref c) = *cache {
            if let Some(count) = c.get(content_hash) {
                return count;
            }
        }
    }

    let count = match BPE.as_ref() {
        Some(bpe) => bpe.lock().encode_with_special_tokens(text).len() as u32,
        None => return estimate_tokens_quick(text),
    };

    {
        let mut cache = TOKEN_CACHE.write();
        if let Some(ref mut c) = *cache {
            c.insert(content_hash, count);
        }
    }

    count
}

/// Count tokens for multiple pieces of text
pub fn count_tokens_batch(texts: &[&str]) -> Vec<u32> {
    texts.iter().map(|t| count_tokens(t)).collect()
}

/// Quick estimate: ~4 chars per token on average
pub fn estimate_tokens_quick(text: &str) -> u32 {
    (text.len() as f64 / 4.0).ceil() as u32
}

/// Truncate `text` to at most `max_tokens` tokens.
///
/// The result always decodes to valid UTF-8: if the cut lands inside a
/// multi-byte character the boundary moves back one token at a time.
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    if max_tokens == 0 {
        return String::new();
    }

    let Some(bpe) = BPE.as_ref() else {
        let mut end = (max_tokens as usize).saturating_mul(4).min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        return text[..end].to_string();
    };

    let bpe = bpe.lock();
    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= max_tokens as usize {
        return text.to_string();
    }

    let mut end = max_tokens as usize;
    while end > 0 {
        if let Ok(decoded) = bpe.decode(tokens[..end].to_vec()) {
            return decoded;
        }
        end -= 1;
    }
    String::new()
}
