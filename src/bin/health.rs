use std::env;
use std::error;

use reqwest::Url;

/// Container health probe: GET the health endpoint and exit nonzero unless
/// it answers 200.
fn main() -> Result<(), Box<dyn error::Error>> {
    let args: Vec<String> = env::args().collect();
    let target = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("http://127.0.0.1:8000/health");

    let url = Url::parse(target)?;

    let body = reqwest::blocking::get(url)?;
    if !body.status().is_success() {
        return Err(format!("health check returned {}", body.status()).into());
    }

    Ok(())
}
