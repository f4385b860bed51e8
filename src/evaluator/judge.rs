// src/evaluator/judge.rs — LLM-backed lesson reviewer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::parser::parse_report;
use super::Evaluator;
use crate::core::cost::{calculate_cost_micros, micros_to_usd, model_pricing};
use crate::core::types::{Lesson, QualityReport};
use crate::infra::config::EvaluatorConfig;
use crate::infra::errors::GateError;
use crate::provider::{CompletionRequest, ModelProvider, StopReason, TokenUsage};

const REVIEW_SYSTEM_PROMPT: &str = "你是一位嚴格的課程品質審核專家，同時具備獸醫臨床背景。\n\
你的任務是審查 AI 生成的課程講稿，找出問題並提供可直接替換的修正文字。\n\
\n\
審查標準（各項 1~10 分）：\n\
1. 口語自然度：聽起來像真人說話，而不是唸稿\n\
2. 專業正確性：醫療資訊正確、沒有誤導\n\
3. 教學結構：結構合理、學習曲線順暢\n\
4. 案例實用性：情境寫實、可以直接應用\n\
5. 字數節奏：每個 segment 的時長合理\n\
6. 視覺指示：visual_notes 足以讓影片製作執行\n\
7. 測驗品質：題目有鑑別度並對應課程內容\n\
\n\
輸出規則：\n\
- 只輸出 JSON，不要任何說明文字\n\
- 每個 issue 的 original_text 必須逐字出現在該 segment 的講稿中\n\
- 每個 issue 都要提供 revised_text\n\
- verdict 必須符合評分標準";

fn review_prompt(lesson_json: &str, lesson_id: &str) -> String {
    format!(
        "請審查以下講稿並給出評分與修改建議。\n\n\
         講稿內容：\n{lesson_json}\n\n\
         請以 JSON 格式輸出：\n\
         {{\n\
           \"lesson_id\": \"{lesson_id}\",\n\
           \"overall_score\": 0-100,\n\
           \"scores\": {{\"口語自然度\": 1-10, \"專業正確性\": 1-10, \"教學結構\": 1-10, \
         \"案例實用性\": 1-10, \"字數節奏\": 1-10, \"視覺指示\": 1-10, \"測驗品質\": 1-10}},\n\
           \"issues\": [{{\"severity\": \"high|medium|low\", \"segment_id\": \"seg-XX\", \
         \"issue\": \"問題描述\", \"original_text\": \"有問題的原文\", \
         \"suggestion\": \"修改建議\", \"revised_text\": \"修改後的版本\"}}],\n\
           \"general_feedback\": \"整體回饋（100字內）\",\n\
           \"verdict\": \"approved|revision_needed|rejected\"\n\
         }}\n\n\
         verdict 判斷標準：\n\
         - approved：overall_score >= 80 且無 high severity issue\n\
         - rejected：overall_score < 60\n\
         - 其餘皆為 revision_needed"
    )
}

/// Reviews lessons by asking a model for a JSON quality report.
///
/// Each `evaluate` makes up to `max_attempts` calls; a call whose output does
/// not parse or validate counts as a failed attempt. Token spend from every
/// call, failed or not, is accumulated and drained by `take_spend`.
pub struct LlmEvaluator {
    provider: Arc<dyn ModelProvider>,
    model: String,
    max_tokens: u32,
    max_attempts: u32,
    retry_delay: Duration,
    spent_micros: AtomicU64,
}

impl LlmEvaluator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: &EvaluatorConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            spent_micros: AtomicU64::new(0),
        }
    }

    fn record_usage(&self, usage: &TokenUsage) {
        let (input_price, output_price) = self.pricing();
        let micros = calculate_cost_micros(input_price, output_price, usage);
        self.spent_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Prices from the provider's list, falling back to name matching.
    fn pricing(&self) -> (f64, f64) {
        self.provider
            .price_list()
            .into_iter()
            .find(|p| p.model == self.model)
            .map(|p| (p.input_per_mtok, p.output_per_mtok))
            .unwrap_or_else(|| model_pricing(&self.model))
    }

    async fn attempt(&self, lesson: &Lesson, prompt: &str) -> anyhow::Result<QualityReport> {
        let completion = self
            .provider
            .complete(CompletionRequest {
                model: self.model.clone(),
                system: Some(REVIEW_SYSTEM_PROMPT.into()),
                prompt: prompt.to_string(),
                max_tokens: self.max_tokens,
            })
            .await?;
        self.record_usage(&completion.usage);
        tracing::debug!(
            lesson = %lesson.lesson_id,
            tokens = completion.usage.total(),
            "Review received"
        );
        if completion.stop_reason == StopReason::MaxTokens {
            tracing::warn!(
                lesson = %lesson.lesson_id,
                max_tokens = self.max_tokens,
                "Review cut off at max_tokens"
            );
        }

        let mut report = parse_report(&completion.text)?;
        if report.lesson_id != lesson.lesson_id {
            tracing::debug!(
                expected = %lesson.lesson_id,
                got = %report.lesson_id,
                "Report lesson_id mismatch, normalizing"
            );
            report.lesson_id = lesson.lesson_id.clone();
        }
        Ok(report)
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, lesson: &Lesson) -> anyhow::Result<QualityReport> {
        let lesson_json = serde_json::to_string_pretty(lesson)?;
        let prompt = review_prompt(&lesson_json, &lesson.lesson_id);

        let mut attempt = 1;
        loop {
            match self.attempt(lesson, &prompt).await {
                Ok(report) => {
                    tracing::info!(
                        lesson = %lesson.lesson_id,
                        score = report.overall_score,
                        verdict = %report.verdict,
                        "Quality check done"
                    );
                    return Ok(report);
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        lesson = %lesson.lesson_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Quality check attempt failed: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(GateError::Evaluator {
                        unit: lesson.lesson_id.clone(),
                        message: format!("failed after {} attempts: {:#}", self.max_attempts, e),
                    }
                    .into());
                }
            }
        }
    }

    fn take_spend(&self) -> Option<f64> {
        Some(micros_to_usd(self.spent_micros.swap(0, Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Segment, Verdict};
    use crate::provider::{Completion, ModelPrice};
    use std::sync::Mutex;

    const APPROVED: &str = r#"```json
{"lesson_id": "lesson-01-01", "overall_score": 84,
 "scores": {"口語自然度": 8, "專業正確性": 9, "教學結構": 8, "案例實用性": 8,
            "字數節奏": 8, "視覺指示": 8, "測驗品質": 9},
 "issues": [], "general_feedback": "講稿自然", "verdict": "approved"}
```"#;

    /// Replays canned responses in order.
    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Self {
            let mut r: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
            r.reverse();
            Self {
                responses: Mutex::new(r),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }
        fn price_list(&self) -> Vec<ModelPrice> {
            vec![]
        }
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, GateError> {
            self.calls.lock().unwrap().push(request);
            let text = self.responses.lock().unwrap().pop().ok_or_else(|| {
                GateError::Provider {
                    provider: "scripted".into(),
                    message: "out of responses".into(),
                    retriable: false,
                }
            })?;
            Ok(Completion {
                text,
                usage: TokenUsage {
                    input_tokens: 1000,
                    output_tokens: 500,
                    cache_read_tokens: 0,
                    cache_write_tokens: 0,
                },
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig {
            retry_delay_ms: 0,
            ..EvaluatorConfig::default()
        }
    }

    fn lesson() -> Lesson {
        Lesson {
            lesson_id: "lesson-01-01".into(),
            segments: vec![Segment {
                segment_id: "seg-01".into(),
                script: "各位獸醫師大家好".into(),
                extra: serde_json::Map::new(),
            }],
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_evaluate_first_try() {
        let provider = Arc::new(ScriptedProvider::new(&[APPROVED]));
        let evaluator = LlmEvaluator::new(provider.clone(), &config());
        let report = evaluator.evaluate(&lesson()).await.unwrap();
        assert_eq!(report.verdict, Verdict::Approved);

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("各位獸醫師大家好"));
        assert!(calls[0].system.is_some());
    }

    #[tokio::test]
    async fn test_evaluate_retries_unparseable_output() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "<html>502 Bad Gateway</html>",
            "抱歉，我無法完成",
            APPROVED,
        ]));
        let evaluator = LlmEvaluator::new(provider.clone(), &config());
        let report = evaluator.evaluate(&lesson()).await.unwrap();
        assert_eq!(report.overall_score, 84.0);
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_evaluate_gives_up_after_max_attempts() {
        let provider = Arc::new(ScriptedProvider::new(&["nope", "nope", "nope", APPROVED]));
        let evaluator = LlmEvaluator::new(provider.clone(), &config());
        let err = evaluator.evaluate(&lesson()).await.unwrap_err();
        assert!(err.to_string().contains("failed after 3 attempts"));
        assert!(matches!(
            err.downcast_ref::<GateError>(),
            Some(GateError::Evaluator { unit, .. }) if unit == "lesson-01-01"
        ));
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_spend_includes_failed_attempts_and_drains() {
        let provider = Arc::new(ScriptedProvider::new(&["nope", APPROVED]));
        let evaluator = LlmEvaluator::new(provider, &config());
        evaluator.evaluate(&lesson()).await.unwrap();
        // Unknown provider model list -> sonnet pricing: 10_500 micros per call
        let spent = evaluator.take_spend().unwrap();
        assert!((spent - 0.021).abs() < 1e-9);
        assert_eq!(evaluator.take_spend(), Some(0.0));
    }

    #[tokio::test]
    async fn test_lesson_id_normalized() {
        let other = APPROVED.replace("lesson-01-01", "lesson-09-09");
        let provider = Arc::new(ScriptedProvider::new(&[&other]));
        let evaluator = LlmEvaluator::new(provider, &config());
        let report = evaluator.evaluate(&lesson()).await.unwrap();
        assert_eq!(report.lesson_id, "lesson-01-01");
    }
}
