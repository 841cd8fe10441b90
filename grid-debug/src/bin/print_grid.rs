//! Grid Snapshot Printer
//!
//! Prints a persisted grid snapshot to the terminal. Useful for
//! debugging crash recovery and inspecting grid state without a live
//! chain connection.
//!
//! ## Usage
//!
//! ```bash
//! grid-debug print-grid --journal ./dev-data/grid_execution.jsonl
//! grid-debug print-grid --journal ./dev-data/grid_execution.jsonl --format json
//! ```

use anyhow::Result;
use clap::Parser;
use grid_core::core::types::{Order, OrderState, OrderType};
use grid_core::persistence::FileJournal;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

#[derive(Parser)]
#[command(name = "print-grid")]
#[command(about = "Print a persisted grid snapshot", long_about = None)]
struct Args {
    /// Path to the journal file to replay.
    #[arg(short, long)]
    journal: String,

    /// Number of slots per side to display.
    #[arg(short, long, default_value = "10")]
    levels: usize,

    /// Output format (pretty, compact, json).
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let journal = FileJournal::open(&args.journal)?;
    let Some(snapshot) = journal.load().await? else {
        println!("no persisted snapshot at {}", args.journal);
        return Ok(());
    };

    match args.format.as_str() {
        "json" => print_json(&snapshot.orders, snapshot.cache_funds_buy, snapshot.cache_funds_sell, args.levels)?,
        "compact" => print_compact(&snapshot.orders, args.levels),
        _ => print_pretty(&snapshot.orders, snapshot.cache_funds_buy, snapshot.cache_funds_sell, args.levels),
    }

    Ok(())
}

fn buy_side(orders: &[Order]) -> Vec<&Order> {
    let mut v: Vec<&Order> = orders.iter().filter(|o| o.order_type == OrderType::Buy).collect();
    v.sort_by(|a, b| b.price.cmp(&a.price));
    v
}

fn sell_side(orders: &[Order]) -> Vec<&Order> {
    let mut v: Vec<&Order> = orders.iter().filter(|o| o.order_type == OrderType::Sell).collect();
    v.sort_by(|a, b| a.price.cmp(&b.price));
    v
}

fn state_tag(state: OrderState) -> &'static str {
    match state {
        OrderState::Virtual => "virt",
        OrderState::Active => "ACTV",
        OrderState::Partial => "part",
    }
}

fn print_pretty(orders: &[Order], cache_buy: Decimal, cache_sell: Decimal, max_levels: usize) {
    let sells = sell_side(orders);
    let buys = buy_side(orders);
    let max_size = orders.iter().map(|o| o.size).max().unwrap_or(Decimal::ONE).to_f64().unwrap_or(1.0);

    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                    GRID SNAPSHOT                          ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!(
        "║  slots: {}  buy cache: {:.4}  sell cache: {:.4}  ║",
        orders.len(),
        cache_buy,
        cache_sell
    );
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    println!("        SELL        SIZE   STATE      BAR");
    println!("    ════════════════════════════════════════");
    for order in sells.iter().take(max_levels).rev() {
        let bar = create_ascii_bar(order.size.to_f64().unwrap_or(0.0), max_size, 15);
        println!(
            "    {:>10}   {:>6}  {:>4}  {}",
            order.price,
            order.size,
            state_tag(order.state),
            bar
        );
    }

    println!("    ─────────────────────────────────────────");

    println!("        BUY         SIZE   STATE      BAR");
    println!("    ════════════════════════════════════════");
    for order in buys.iter().take(max_levels) {
        let bar = create_ascii_bar(order.size.to_f64().unwrap_or(0.0), max_size, 15);
        println!(
            "    {:>10}   {:>6}  {:>4}  {}",
            order.price,
            order.size,
            state_tag(order.state),
            bar
        );
    }
    println!();
}

fn print_compact(orders: &[Order], max_levels: usize) {
    let sells = sell_side(orders);
    let buys = buy_side(orders);

    for order in sells.iter().take(max_levels).rev() {
        println!("SELL {:>10}  {:>6}  {}", order.price, order.size, state_tag(order.state));
    }
    for order in buys.iter().take(max_levels) {
        println!("BUY  {:>10}  {:>6}  {}", order.price, order.size, state_tag(order.state));
    }
}

fn print_json(orders: &[Order], cache_buy: Decimal, cache_sell: Decimal, max_levels: usize) -> Result<()> {
    let sells: Vec<_> = sell_side(orders)
        .iter()
        .take(max_levels)
        .map(|o| json!({"price": o.price, "size": o.size, "state": state_tag(o.state)}))
        .collect();
    let buys: Vec<_> = buy_side(orders)
        .iter()
        .take(max_levels)
        .map(|o| json!({"price": o.price, "size": o.size, "state": state_tag(o.state)}))
        .collect();

    let output = json!({
        "slot_count": orders.len(),
        "cache_funds_buy": cache_buy,
        "cache_funds_sell": cache_sell,
        "sell": sells,
        "buy": buys,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn create_ascii_bar(size: f64, max_size: f64, width: usize) -> String {
    if max_size <= 0.0 {
        return " ".repeat(width);
    }
    let filled = ((size / max_size) * width as f64) as usize;
    let filled = filled.min(width);
    "█".repeat(filled) + &"░".repeat(width - filled)
}
