//! Turns fired by the debounce buffer become answered replies.

use futures_util::StreamExt;
use std::sync::Arc;

use oraculo::answer::AnswerPipeline;

use crate::buffer::Turn;
use crate::outbound::EvolutionApi;

/// Spawns the worker that drains coalesced turns: one answer pipeline
/// invocation per turn, reply sent back to the turn's sender. Runs
/// until the buffer (every turn sender handle) is dropped.
pub fn spawn_responder(
    turns: flume::Receiver<Turn>,
    answers: Arc<AnswerPipeline>,
    outbound: Arc<EvolutionApi>,
    instance: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(turn) = turns.recv_async().await {
            let question = match answers.open_question(&turn.text).await {
                Ok(question) => question,
                Err(err) => {
                    tracing::error!(sender = %turn.sender, error = %err, "could not record question");
                    continue;
                }
            };

            let mut stream = answers.answer(question);
            let mut reply = String::new();
            while let Some(token) = stream.next().await {
                reply.push_str(&token);
            }
            if reply.trim().is_empty() {
                tracing::warn!(sender = %turn.sender, "answer stream produced nothing");
                continue;
            }

            outbound.send_text(&instance, &turn.sender, &reply).await;
        }
        tracing::debug!("turn channel closed, responder exiting");
    })
}
