// src/cli/run.rs — Terminal surface
//
// One intent per invocation. The terminal user and channel are fixed, so
// repeated invocations share one session (working directory and history
// carry over while the process lives; with persistence enabled they
// carry across restarts too). Clarifying questions are answered inline.

use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::api::gateway::ChatGateway;

const TERMINAL_USER: &str = "local";
const TERMINAL_CHANNEL: &str = "terminal";

pub async fn run_intent(gateway: Arc<ChatGateway>, intent: &str) -> anyhow::Result<()> {
    let mut reply = gateway
        .handle_message(TERMINAL_USER, TERMINAL_CHANNEL, intent)
        .await;

    loop {
        println!("{}", reply.text);
        if reply.is_final {
            return Ok(());
        }

        // The loop is suspended on a question; read the answer.
        print!("> ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer)? == 0 {
            // EOF: stop the pending task rather than leave it suspended.
            let stopped = gateway
                .handle_message(TERMINAL_USER, TERMINAL_CHANNEL, "reset")
                .await;
            println!("{}", stopped.text);
            return Ok(());
        }

        reply = gateway
            .handle_message(TERMINAL_USER, TERMINAL_CHANNEL, answer.trim())
            .await;
    }
}
