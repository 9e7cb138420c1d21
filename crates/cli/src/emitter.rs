//! Event emitter for one-shot runs: prints every event instead of persisting it

use async_trait::async_trait;
use chrono::Utc;
use colored::Colorize;
use steprun_core::domain::{EventData, EventPayload};
use steprun_core::port::{EmitError, EventEmitter};
use steprun_core::ExecContext;

pub struct ConsoleEmitter;

#[async_trait]
impl EventEmitter for ConsoleEmitter {
    async fn emit(&self, _ctx: &ExecContext, data: EventData) -> Result<(), EmitError> {
        // stream events carry {"Msg": ...}; anything else is printed raw
        let body = match data.payload_as::<EventPayload>() {
            Ok(payload) => payload.msg,
            Err(_) => data.payload.clone(),
        };
        println!(
            "{} {} {}",
            Utc::now().format("%H:%M:%S%.3f").to_string().dimmed(),
            format!("[{}]", data.name).cyan().bold(),
            data.target
        );
        if body.is_empty() {
            println!("  {}", "(empty)".dimmed());
        } else {
            for line in body.lines() {
                println!("  {}", line);
            }
        }
        Ok(())
    }
}
