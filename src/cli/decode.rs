use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

use crate::option121::OPTION_CLASSLESS_STATIC_ROUTES;
use crate::{decode_option_121, parse_hex_bytes, parse_packet_dump_option};

pub(crate) fn run_decode(hex: Option<String>, dump: Option<PathBuf>) -> Result<()> {
    let bytes = match (hex, dump) {
        (Some(hex), _) => parse_hex_bytes(&hex).context("Failed to parse hex payload")?,
        (None, Some(path)) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read dump file: {}", path.display()))?;
            parse_packet_dump_option(&text, OPTION_CLASSLESS_STATIC_ROUTES)?
                .ok_or_else(|| anyhow!("No option 121 found in {}", path.display()))?
        }
        (None, None) => bail!("Either --hex or --dump is required"),
    };

    let routes = decode_option_121(&bytes)?;
    if routes.is_empty() {
        println!("No routes.");
    }
    for route in routes {
        println!("{}", route);
    }
    Ok(())
}
