//! Normalize command - Print the canonical form of an output value.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct NormalizeArgs {
    /// Raw value; read from stdin when omitted or "-"
    pub value: Option<String>,
}

pub fn execute(args: NormalizeArgs) -> Result<()> {
    let raw = match args.value.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
        Some(value) => value.to_string(),
    };

    println!("{}", probe_iac::normalize(&raw)?);
    Ok(())
}
