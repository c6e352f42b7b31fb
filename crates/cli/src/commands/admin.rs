//! Operator commands: halt and resume trading for the current day. The
//! flag is read by the next scheduled run, so an in-flight cycle finishes
//! with the state it started with.

use anyhow::Result;
use apex_trade_core::DailyStatsStore;
use chrono::Utc;

use super::wiring::build_components;

pub async fn halt(config_path: &str, reason: &str) -> Result<()> {
    let components = build_components(config_path).await?;
    let day = Utc::now().date_naive();
    components
        .repos
        .daily_stats
        .set_halted(day, true, Some(reason))
        .await?;
    println!("trading halted for {day}: {reason}");
    Ok(())
}

pub async fn resume(config_path: &str) -> Result<()> {
    let components = build_components(config_path).await?;
    let day = Utc::now().date_naive();
    components
        .repos
        .daily_stats
        .set_halted(day, false, None)
        .await?;
    println!("trading resumed for {day}");
    Ok(())
}
