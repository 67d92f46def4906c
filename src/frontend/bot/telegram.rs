//! Telegram transport: long polling via teloxide.

use std::sync::Arc;

use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, Message, Update};
use tracing::{error, info, warn};

use super::{BotFrontend, BotReply};

/// Poll for messages until Ctrl+C.
pub async fn run(frontend: Arc<BotFrontend>, token: &str) {
    let bot = Bot::new(token);

    let menu: Vec<BotCommand> = frontend
        .command_menu()
        .into_iter()
        .map(|(name, description)| BotCommand::new(name, description))
        .collect();
    if let Err(e) = bot.set_my_commands(menu).await {
        warn!("Failed to register bot command menu: {}", e);
    }

    let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let frontend = frontend.clone();
        async move { handle_message(bot, msg, frontend).await }
    });

    info!("Telegram bot is running. Press Ctrl+C to stop.");
    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    info!("Telegram bot stopped");
}

async fn handle_message(bot: Bot, msg: Message, frontend: Arc<BotFrontend>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match frontend.interpret(chat_id.0, text) {
        BotReply::Ignore => {}
        BotReply::Text(reply) => {
            bot.send_message(chat_id, reply).await?;
        }
        BotReply::Execute { target, ack } => {
            info!("Chat {} requested '{}'", chat_id, target);
            let status = bot.send_message(chat_id, ack).await?;

            let worker = frontend.clone();
            let reply = tokio::task::spawn_blocking(move || worker.execute(&target))
                .await
                .unwrap_or_else(|e| {
                    error!("Bot worker failed: {}", e);
                    format!("Unexpected error: {}", e)
                });
            bot.edit_message_text(chat_id, status.id, reply).await?;
        }
    }
    Ok(())
}
