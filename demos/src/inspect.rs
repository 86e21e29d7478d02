use std::env;
use dynabus::master::*;

fn show(name: &str, value: Option<String>) {
    println!("  {:16} {}", name, value.as_deref().unwrap_or("-"));
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let id = env::args().nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);
    let bus = Bus::open(&Settings::from_env()?)?;
    let servo = bus.servo(id)?;

    println!("servo {}: {}", id, servo.model().await?);
    let state = servo.inspect().await;
    show("return level", state.return_level.map(|level| level.to_string()));
    show("torque", state.torque_enabled.map(|on| (if on {"on"} else {"off"}).to_string()));
    show("position", state.position.map(|value| format!("{:.1} deg", value)));
    show("speed", state.speed.map(|value| format!("{:.1} rpm", value)));
    show("load", state.load.map(|value| format!("{:.1} %", value)));
    show("voltage", state.voltage.map(|value| format!("{:.1} V", value)));
    show("temperature", state.temperature.map(|value| format!("{:.0} C", value)));
    Ok(())
}
