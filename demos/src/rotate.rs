use std::{env, time::Duration};
use dynabus::{
    registers,
    master::*,
    };

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let mut args = env::args().skip(1);
    let id = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(1);
    let angle = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(150.);

    let bus = Bus::open(&Settings::from_env()?)?;
    let servo = bus.servo(id)?;
    let goal = servo.rotate_to(angle).await?;
    println!("servo {} moving to {} deg ({} units)", id, angle, goal);

    for _ in 0 .. 20 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let feedback = servo.feedback().await?;
        println!("  position {:4}  speed {:4}  load {:6.1}%",
            feedback.position,
            feedback.speed,
            feedback.load.percent(),
            );
        if servo.read(registers::MOVING).await? == 0
            {break}
    }
    Ok(())
}
