//! Look up display corner radii from the embedded table
//!
//! Run with: cargo run -p bezel --example lookup -- iPhone14,2 iPhone9,1
//!
//! With no arguments, looks up the simulated device named by
//! `SIMULATOR_MODEL_IDENTIFIER`.

use bezel::{BezelTable, Fallback};

fn main() -> bezel::Result<()> {
    let table = BezelTable::embedded()?;
    println!("{} devices in the embedded table", table.len());

    let mut identifiers: Vec<String> = std::env::args().skip(1).collect();
    if identifiers.is_empty() {
        identifiers.extend(bezel::current_identifier());
    }
    if identifiers.is_empty() {
        println!("No identifiers given and not running in a simulator");
        return Ok(());
    }

    // Square-cornered devices get a small radius so rounded UI still looks right
    let fallback = Fallback::new(12.0).with_zero(4.0);
    for identifier in &identifiers {
        match table.lookup(identifier) {
            Some(radius) => println!(
                "{identifier}: {radius} pt (resolved {} pt)",
                table.resolve(identifier, fallback)
            ),
            None => println!(
                "{identifier}: unknown (fallback {} pt)",
                table.resolve(identifier, fallback)
            ),
        }
    }
    Ok(())
}
