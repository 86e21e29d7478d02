use std::env;
use dynabus::{
    frame::MAX_ID,
    master::*,
    };

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let settings = Settings::from_env()?;
    // optional last identifier to try, a full scan takes a few seconds
    let last = env::args().nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(MAX_ID)
        .min(MAX_ID);

    println!("scanning {} at {} bit/s, ids 0..={}", settings.port, settings.baud_rate, last);
    let bus = Bus::open(&settings)?;
    let found = bus.scan(0 ..= last).await?;
    for (id, model) in &found {
        println!("  {:3}  {}", id, model);
    }
    println!("{} servos found", found.len());
    Ok(())
}
