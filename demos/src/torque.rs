use std::env;
use dynabus::master::*;

/// `torque off` releases every servo on the bus, `torque on` makes them hold again
#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let enable = match env::args().nth(1).as_deref() {
        Some("on") => true,
        Some("off") | None => false,
        Some(other) => {
            eprintln!("expected on or off, got {:?}", other);
            std::process::exit(2);
        },
    };
    let bus = Bus::open(&Settings::from_env()?)?;
    bus.broadcast().set_torque(enable).await?;
    println!("torque {} on all servos", if enable {"enabled"} else {"released"});
    Ok(())
}
