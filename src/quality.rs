use anyhow::anyhow;

use crate::sentinels::tokens_in;

/// Checks a translated chunk against its source: not empty, no invented tokens, and every
/// token of the source present exactly as often as before. Token order may change, since
/// Russian word order legitimately moves them.
pub fn validate_tokens(source: &str, translated: &str) -> anyhow::Result<()> {
    if translated.trim().is_empty() && !source.trim().is_empty() {
        return Err(anyhow!("empty_output"));
    }
    let mut src = tokens_in(source);
    let mut tgt = tokens_in(translated);
    if src.len() != tgt.len() {
        return Err(anyhow!(
            "token_count_mismatch src={} tgt={}",
            src.len(),
            tgt.len()
        ));
    }
    src.sort();
    tgt.sort();
    if src != tgt {
        let unexpected: Vec<&String> = tgt.iter().filter(|t| !src.contains(t)).collect();
        return Err(anyhow!("token_set_mismatch unexpected={unexpected:?}"));
    }
    Ok(())
}
