use std::{env, time::{Instant, Duration}};
use log::*;
use dynabus::{
    registers,
    master::*,
    };

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let id = env::args().nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);
    let bus = Bus::open(&Settings::from_env()?)?;
    let servo = bus.servo(id)?;

    for size in [1u8, 2, 8, 16, 32, 49] {
        let mut total = Duration::ZERO;
        let mut failed = 0;
        for _ in 0 .. 100 {
            let start = Instant::now();
            match bus.read_register(servo.id(), registers::MODEL_NUMBER.address(), size).await {
                Ok(_) => total += start.elapsed(),
                Err(error) => {
                    warn!("read of {} bytes failed: {}", size, error);
                    failed += 1;
                },
            }
        }
        let succeeded = 100 - failed;
        println!(" size {:2}:  mean {:?}  failed {}",
            size,
            total.checked_div(succeeded).unwrap_or_default(),
            failed,
            );
    }
    Ok(())
}
