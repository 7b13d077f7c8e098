use std::fmt::Write;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::GenerationConfig;
use hotelrag_core::traits::{ChatModel, ChatRequest, FragmentStream};
use hotelrag_core::types::{Intent, MatchedSummary, PriorTurn};
use hotelrag_core::ModelError;

use crate::format::EvidenceItem;

pub const NO_EVIDENCE_REPLY: &str = "抱歉，没有检索到与您问题相关的住客评论，暂时无法基于真实评价回答这个问题。您可以换个说法或询问其他方面。";
pub const RETRIEVAL_DOWN_REPLY: &str = "抱歉，评论检索服务暂时不可用，暂时无法基于住客评价回答这个问题，请稍后再试。";

/// Everything the answer is grounded on.
pub struct GenerationContext<'a> {
    pub question: &'a str,
    pub prior: Option<&'a PriorTurn>,
    pub intent: &'a Intent,
    pub evidence: &'a [EvidenceItem],
    pub summaries: &'a [MatchedSummary],
    pub retrieval_failed: bool,
    pub as_of: NaiveDate,
}

impl GenerationContext<'_> {
    /// Fixed reply used instead of calling the model when retrieval was
    /// needed but produced nothing.
    pub fn canned_reply(&self) -> Option<&'static str> {
        if !self.intent.needs_retrieval || !self.evidence.is_empty() {
            return None;
        }
        Some(if self.retrieval_failed { RETRIEVAL_DOWN_REPLY } else { NO_EVIDENCE_REPLY })
    }
}

pub struct ResponseGenerator {
    chat: Arc<dyn ChatModel>,
    cfg: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, cfg: GenerationConfig) -> Self {
        Self { chat, cfg }
    }

    fn history(prior: Option<&PriorTurn>) -> String {
        match prior {
            Some(p) if !p.user.trim().is_empty() && !p.assistant.trim().is_empty() => {
                format!("【上一轮对话】\n用户：{}\n助手：{}\n", p.user, p.assistant)
            }
            _ => String::new(),
        }
    }

    pub fn build_prompt(&self, ctx: &GenerationContext<'_>) -> String {
        let hotel = &self.cfg.hotel_name;
        let history = Self::history(ctx.prior);
        if !ctx.intent.needs_retrieval {
            return format!(
                "你是{hotel}的智能客服助手。\n\n{history}\n用户问题：{question}\n\n请直接回答用户的问题。注意：\n\
                 - 如果是问候或闲聊，友好回应\n\
                 - 如果是通用问题，给出简洁准确的回答\n\
                 - 如果用户的问题是对上一轮对话的追问，请结合上下文理解用户意图\n\
                 - 语气要亲切专业\n\
                 - 使用Markdown格式输出，不得出现代码块标记\n",
                question = ctx.question
            );
        }

        let mut queries = String::new();
        if !ctx.intent.sub_queries.is_empty() {
            queries.push_str("【问题解析】\n系统识别到用户可能关注以下方面：\n");
            for q in &ctx.intent.sub_queries {
                let _ = writeln!(queries, "- {}（意图权重为{}）", q.text, q.weight);
            }
            queries.push_str("注意：权重信息是用来帮助你区分意图主次的，**不得**向用户输出权重相关信息。\n");
        }

        let mut comments = String::from("【相关用户评论】\n");
        for (i, e) in ctx.evidence.iter().enumerate() {
            let c = &e.comment;
            let date = c.publish_date.map_or_else(|| "未知".to_string(), |d| d.to_string());
            let _ = write!(
                comments,
                "\n【评论{}】\n评分: {}（满分5分）\n发布日期: {}\n评论文本: {}\n点赞数: {}\n回复数: {}\n房型: {}\n",
                i + 1,
                c.score,
                date,
                c.text,
                c.useful_count,
                c.review_count,
                c.room_type.as_deref().unwrap_or("未知"),
            );
        }

        let mut summaries = String::new();
        if !ctx.summaries.is_empty() {
            summaries.push_str("【相关评论摘要】\n");
            for s in ctx.summaries {
                let _ = write!(summaries, "\n【{}类别摘要】\n关键词: {}\n摘要: {}\n", s.category, s.keywords, s.summary);
            }
            summaries.push_str(
                "\n注意：用户只能看到【相关用户评论】的引用而看不到摘要，回复中可以给出摘要中的概括信息，但不得过于精确，\
                 不得告诉用户你引用了摘要，更不得将其当作评论引用输出“评论x”。与问题无关的摘要直接忽略。\n",
            );
        }

        let d = ctx.as_of;
        format!(
            "你是{hotel}的智能客服助手，需要基于用户评论为用户提供准确、高质量、有帮助、简洁的回答。\n\n\
             今天是：{y}年{m}月{day}日\n\n{history}\n用户问题：{question}\n\n{queries}\n{comments}\n{summaries}\n\
             【回答要求】\n\
             1. 综合以上评论信息，给出客观、全面的回答，突出重点\n\
             2. 如有正面和负面评价，都要提及；参考评论并不代表全部，避免绝对化表述\n\
             3. 不得大段照抄评论，相似内容合并后归纳总结\n\
             4. 越靠前的评论重要性越高\n\
             5. 不得罗列评论的具体日期；用户关心时效时可以大致提及时间范围\n\
             6. 引用某条评论的独特内容时标注序号（如“评论2”），只标注非常确定的引用，同时列出的序号不超过3个，多于3个时写作“评论1/3等”\n\
             7. 如果评论信息不足以回答问题，诚实说明\n\
             8. 只依据检索到的评论和摘要作答，不得编造房态、活动等评论之外的信息\n\
             9. 使用Markdown格式输出，不得出现代码块标记\n\n\
             用户问题：{question}\n\n请给出你的回答：\n",
            y = d.year(),
            m = d.month(),
            day = d.day(),
            question = ctx.question,
        )
    }

    fn request(&self, ctx: &GenerationContext<'_>) -> ChatRequest {
        ChatRequest::prompt(self.build_prompt(ctx), self.cfg.temperature)
    }

    pub async fn generate(&self, ctx: &GenerationContext<'_>, cancel: &CancellationToken) -> Result<String, ModelError> {
        if let Some(reply) = ctx.canned_reply() {
            return Ok(reply.to_string());
        }
        self.chat.complete(&self.request(ctx), cancel).await
    }

    /// Fragments end silently when `cancel` fires; fragments already yielded stand.
    pub async fn generate_stream(&self, ctx: &GenerationContext<'_>, cancel: &CancellationToken) -> Result<FragmentStream, ModelError> {
        if let Some(reply) = ctx.canned_reply() {
            return Ok(futures::stream::once(async move { Ok(reply.to_string()) }).boxed());
        }
        self.chat.stream(&self.request(ctx), cancel).await
    }
}
