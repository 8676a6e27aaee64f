use std::time::Duration;

use tracing::{debug, warn};

use crate::chunker::chunk_by_sentences;
use crate::error::ChatError;
use crate::models::ChatModel;
use crate::pipeline::prompts::render_template;
use crate::progress::ConsoleProgress;
use crate::quality::validate_tokens;
use crate::sentinels::normalize_tokens;
use crate::textutil::{is_trivial_token_text, split_outer_whitespace, truncate_for_log};

/// Best-effort text translation. Implementations never fail: on error they hand back the
/// input unchanged.
pub trait Translate {
    fn translate(&self, text: &str) -> String;
}

impl<F> Translate for F
where
    F: Fn(&str) -> String,
{
    fn translate(&self, text: &str) -> String {
        self(text)
    }
}

/// Returns every input unchanged. Used for dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTranslator;

impl Translate for IdentityTranslator {
    fn translate(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt. HTTP 429 gets the longer rate-limit delay.
    pub fn backoff_for(&self, err: &ChatError) -> Duration {
        match err {
            ChatError::RateLimited => self.rate_limit_delay,
            _ => self.delay,
        }
    }
}

/// Wraps a chat model with the translation prompt, retries and the identity fallback.
pub struct LlmTranslator<M: ChatModel> {
    model: M,
    prompt_template: String,
    source_lang: String,
    target_lang: String,
    retry: RetryPolicy,
}

impl<M: ChatModel> LlmTranslator<M> {
    pub fn new(
        model: M,
        prompt_template: String,
        source_lang: String,
        target_lang: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            prompt_template,
            source_lang,
            target_lang,
            retry,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn request(&self, core: &str) -> Option<String> {
        let prompt = render_template(
            &self.prompt_template,
            &[
                ("source_lang", self.source_lang.as_str()),
                ("target_lang", self.target_lang.as_str()),
                ("text", core),
            ],
        );
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            let err = match self.model.chat(&prompt) {
                Ok(out) => return Some(out),
                Err(e) => e,
            };
            if matches!(err, ChatError::RateLimited) {
                warn!(attempt, attempts, model = self.model.name(), "rate limited");
            } else {
                warn!(attempt, attempts, model = self.model.name(), error = %err, "translation request failed");
            }
            let wait = self.retry.backoff_for(&err);
            if attempt < attempts && !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
        None
    }
}

impl<M: ChatModel> Translate for LlmTranslator<M> {
    fn translate(&self, text: &str) -> String {
        if is_trivial_token_text(text) {
            return text.to_string();
        }
        let (lead, core, trail) = split_outer_whitespace(text);
        match self.request(core) {
            Some(out) => format!("{lead}{}{trail}", out.trim()),
            None => {
                warn!(
                    text = %truncate_for_log(core, 80),
                    "translation failed after all attempts; keeping source text"
                );
                text.to_string()
            }
        }
    }
}

/// Chunks `text` by sentences and translates chunk by chunk in source order. A chunk whose
/// translation loses, duplicates or invents tokens is kept untranslated.
pub fn translate_chunks(
    translator: &dyn Translate,
    text: &str,
    max_tokens: usize,
    progress: Option<(&ConsoleProgress, &str)>,
) -> String {
    let chunks = chunk_by_sentences(text, max_tokens);
    let total = chunks.len();
    let mut out = String::with_capacity(text.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if let Some((p, label)) = progress {
            p.progress(label, i + 1, total);
        }
        if is_trivial_token_text(chunk) {
            out.push_str(chunk);
            continue;
        }
        let translated = normalize_tokens(&translator.translate(chunk));
        match validate_tokens(chunk, &translated) {
            Ok(()) => out.push_str(&translated),
            Err(e) => {
                warn!(chunk = i + 1, total, reason = %e, "rejected translation; keeping source chunk");
                out.push_str(chunk);
            }
        }
    }
    debug!(chunks = total, in_chars = text.len(), out_chars = out.len(), "translated chunks");
    out
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct ScriptedModel {
        replies: RefCell<Vec<Result<String, ChatError>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ChatError>>) -> Self {
            Self {
                replies: RefCell::new(replies),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn chat(&self, prompt: &str) -> Result<String, ChatError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                return Err(ChatError::Empty);
            }
            replies.remove(0)
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    fn translator(model: ScriptedModel) -> LlmTranslator<ScriptedModel> {
        LlmTranslator::new(
            model,
            "{{source_lang}}->{{target_lang}}: {{text}}".to_string(),
            "English".to_string(),
            "Russian".to_string(),
            no_wait(),
        )
    }

    #[test]
    fn retries_then_succeeds_and_keeps_outer_whitespace() {
        let model = ScriptedModel::new(vec![
            Err(ChatError::RateLimited),
            Err(ChatError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            Ok("Привет.".to_string()),
        ]);
        let tr = translator(model);
        assert_eq!(tr.translate("\n Hello. "), "\n Привет. ");
        let prompts = tr.model().prompts.borrow();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0], "English->Russian: Hello.");
    }

    #[test]
    fn rate_limit_waits_longer_than_other_failures() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(7),
        };
        assert_eq!(policy.backoff_for(&ChatError::RateLimited), Duration::from_secs(7));
        assert_eq!(
            policy.backoff_for(&ChatError::Transport("reset".to_string())),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.backoff_for(&ChatError::Status {
                status: 500,
                body: String::new(),
            }),
            Duration::from_secs(1)
        );
        assert_eq!(policy.backoff_for(&ChatError::Empty), Duration::from_secs(1));
    }

    #[test]
    fn exhausted_retries_return_source() {
        let model = ScriptedModel::new(vec![
            Err(ChatError::Transport("timeout".to_string())),
            Err(ChatError::Transport("timeout".to_string())),
            Err(ChatError::Transport("timeout".to_string())),
            Ok("never reached".to_string()),
        ]);
        let tr = translator(model);
        assert_eq!(tr.translate("Hello."), "Hello.");
        assert_eq!(tr.model().prompts.borrow().len(), 3);
    }

    #[test]
    fn token_only_text_is_never_sent() {
        let tr = translator(ScriptedModel::new(vec![]));
        assert_eq!(tr.translate(" <<TX_PH:000001>>\n"), " <<TX_PH:000001>>\n");
        assert!(tr.model().prompts.borrow().is_empty());
    }

    #[test]
    fn chunk_losing_a_token_falls_back_to_source() {
        let drop_tokens = |s: &str| s.replace("<<TX_PH:000000>>", "").to_uppercase();
        let out = translate_chunks(&drop_tokens, "See <<TX_PH:000000>> here. Next one.", 4, None);
        assert_eq!(out, "See <<TX_PH:000000>> here. NEXT ONE.");
    }

    #[test]
    fn mangled_tokens_are_repaired() {
        let mangle = |s: &str| s.replace("<<TX_PH:000003>>", "« TX_PH:3 »");
        let out = translate_chunks(&mangle, "Value <<TX_PH:000003>> holds.", 100, None);
        assert_eq!(out, "Value <<TX_PH:000003>> holds.");
    }
}
