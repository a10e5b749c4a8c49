use std::io::{BufRead, Write};

use clap::Parser;

use crate::errors::AppResult;

#[derive(Parser, Debug, Default)]
#[command(
    name = "city-poi-collector",
    version,
    about = "Collect cafes, shops, pharmacies, schools and museums of a city into SQLite"
)]
pub struct Cli {
    /// City to collect; prompts on the console when omitted.
    #[arg(short, long)]
    pub city: Option<String>,
}

/// Picks the target city: a non-empty `--city` flag wins, otherwise the user is
/// prompted. Blank answers fall back to `default_city`.
pub fn resolve_city<R, W>(
    flag: Option<&str>,
    mut input: R,
    mut output: W,
    default_city: &str,
) -> AppResult<String>
where
    R: BufRead,
    W: Write,
{
    let raw = match flag.map(str::trim).filter(|v| !v.is_empty()) {
        Some(city) => city.to_string(),
        None => {
            write!(
                output,
                "Введите город для поиска (по умолчанию {default_city}): "
            )?;
            output.flush()?;
            let mut line = String::new();
            input.read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    let city = if raw.is_empty() {
        default_city.to_string()
    } else {
        capitalize(&raw)
    };
    writeln!(output, "Используем город: {city}")?;
    Ok(city)
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
