use std::time::Duration;

use dynabus::{
    frame::{FrameError, BROADCAST},
    registers::{self, Load},
    master::*,
    master::simulator::*,
    };


fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(servos: impl IntoIterator<Item=VirtualServo>) -> (Simulator, Bus<SimulatedLink>) {
    init();
    let simulator = Simulator::new();
    for servo in servos {
        simulator.add_servo(servo);
    }
    let bus = simulator.bus(Timing {
        read_timeout: Duration::from_millis(5),
        write_timeout: Duration::from_millis(5),
        .. Timing::default()
    });
    (simulator, bus)
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.05
}


#[tokio::test]
async fn identify_models() {
    let (_, bus) = setup([VirtualServo::new(1, 0x000c), VirtualServo::new(3, 0x0012)]);

    let model = bus.servo(1).unwrap().model().await.unwrap();
    assert_eq!(model, Model {number: 0x000c});
    assert_eq!(model.name(), Some("AX-12A"));
    assert_eq!(Model {number: 0x0777}.name(), None);

    let found = bus.scan(0 .. 6).await.unwrap();
    assert_eq!(found, vec![(1, Model {number: 0x000c}), (3, Model {number: 0x0012})]);
    assert_eq!(found[1].1.name(), Some("AX-18A"));
}

#[tokio::test]
async fn scan_stops_on_rejection() {
    let (_, bus) = setup([
        VirtualServo::new(1, 0x000c),
        VirtualServo::new(2, 0x000c).with_fault(Fault::Reject(0x40)),
        ]);
    let error = bus.scan([1, 2]).await.unwrap_err();
    assert!(error.is_rejected());
    // noisy ids are skipped like absent ones
    let (_, bus) = setup([
        VirtualServo::new(1, 0x000c).with_fault(Fault::CorruptChecksum),
        VirtualServo::new(2, 0x012c),
        ]);
    assert_eq!(bus.scan(0 ..= 3).await.unwrap(), vec![(2, Model {number: 0x012c})]);
}

#[tokio::test]
async fn servo_handles() {
    let (_, bus) = setup([VirtualServo::new(1, 0x000c)]);
    assert_eq!(bus.servo(1).unwrap().id(), 1);
    assert!(matches!(bus.servo(BROADCAST), Err(Error::Frame(FrameError::Construction(_)))));
    assert!(matches!(bus.servo(0xff), Err(Error::Frame(FrameError::Construction(_)))));
}

#[tokio::test]
async fn rotate() {
    let (simulator, bus) = setup([VirtualServo::new(1, 0x000c)]);
    let servo = bus.servo(1).unwrap();

    assert_eq!(servo.rotate_to(120.).await.unwrap(), 409);
    let state = simulator.servo(1).unwrap();
    assert_eq!(state.get(registers::TORQUE_ENABLE), 1);
    assert_eq!(state.get(registers::GOAL_POSITION), 409);
    assert_eq!(servo.read(registers::PRESENT_POSITION).await.unwrap(), 409);

    simulator.clear_events();
    assert!(matches!(servo.rotate_to(300.5).await, Err(Error::Frame(FrameError::Construction(_)))));
    assert!(matches!(servo.rotate_to(-1.).await, Err(Error::Frame(FrameError::Construction(_)))));
    assert!(simulator.events().is_empty());
    assert_eq!(servo.rotate_to(300.).await.unwrap(), 1023);
}

#[tokio::test]
async fn torque_switching() {
    let (simulator, bus) = setup([VirtualServo::new(1, 0x000c), VirtualServo::new(2, 0x000c)]);

    assert_eq!(bus.servo(2).unwrap().set_torque(true).await.unwrap(), Acknowledge::Accepted);
    assert_eq!(simulator.servo(2).unwrap().get(registers::TORQUE_ENABLE), 1);
    bus.broadcast().set_torque(true).await.unwrap();
    assert_eq!(simulator.servo(1).unwrap().get(registers::TORQUE_ENABLE), 1);
    bus.broadcast().set_torque(false).await.unwrap();
    for id in [1, 2] {
        assert_eq!(simulator.servo(id).unwrap().get(registers::TORQUE_ENABLE), 0);
    }
    bus.broadcast().write(registers::LED, 1).await.unwrap();
    assert_eq!(simulator.servo(2).unwrap().get(registers::LED), 1);
}

#[tokio::test]
async fn physical_values() {
    let (simulator, bus) = setup([VirtualServo::new(1, 0x000c)]);
    let servo = bus.servo(1).unwrap();

    let position = registers::describe("present_position").unwrap();
    assert!(close(servo.read_physical(position).await.unwrap(), 150.1));
    let voltage = registers::describe("present_voltage").unwrap();
    assert!(close(servo.read_physical(voltage).await.unwrap(), 12.));

    let goal = registers::describe("goal_position").unwrap();
    assert_eq!(servo.write_physical(goal, 150.).await.unwrap(), Acknowledge::Accepted);
    assert_eq!(simulator.servo(1).unwrap().get(registers::GOAL_POSITION), 512);
    let led = registers::describe("led").unwrap();
    servo.write_physical(led, 1.).await.unwrap();
    assert_eq!(simulator.servo(1).unwrap().get(registers::LED), 1);

    assert!(matches!(servo.write_physical(position, 10.).await, Err(Error::Frame(FrameError::Construction(_)))));
}

#[tokio::test]
async fn inspection() {
    let mut servo = VirtualServo::new(1, 0x000c);
    servo.set(registers::PRESENT_LOAD, Load::from(0x0600u16));
    servo.set(registers::PRESENT_SPEED, 100);
    servo.set(registers::TORQUE_ENABLE, 1);
    let (simulator, bus) = setup([servo]);

    let inspection = bus.servo(1).unwrap().inspect().await;
    assert_eq!(inspection.return_level, Some(2));
    assert_eq!(inspection.torque_enabled, Some(true));
    assert!(close(inspection.position.unwrap(), 150.1));
    assert!(close(inspection.speed.unwrap(), 11.1));
    assert!(close(inspection.load.unwrap(), -50.05));
    assert!(close(inspection.voltage.unwrap(), 12.));
    assert!(close(inspection.temperature.unwrap(), 35.));

    simulator.set_fault(1, Fault::Silent);
    assert_eq!(bus.servo(1).unwrap().inspect().await, Inspection::default());
}

#[tokio::test]
async fn feedback_block() {
    let (simulator, bus) = setup([VirtualServo::new(1, 0x000c)]);
    simulator.update(1, |servo| servo.set(registers::PRESENT_TEMPERATURE, 41));

    let feedback = bus.servo(1).unwrap().feedback().await.unwrap();
    assert_eq!(feedback.position, 512);
    assert_eq!(feedback.speed, 0);
    assert!(!feedback.load.clockwise());
    assert_eq!(feedback.voltage, 120);
    assert_eq!(feedback.temperature, 41);
}

#[tokio::test]
async fn change_identifier() {
    let (simulator, bus) = setup([VirtualServo::new(1, 0x000c)]);

    bus.servo(1).unwrap().write(registers::ID, 7).await.unwrap();
    assert!(simulator.servo(1).is_none());
    assert_eq!(bus.servo(7).unwrap().model().await.unwrap().number, 0x000c);
    assert!(bus.servo(1).unwrap().model().await.unwrap_err().is_unreachable());
}

#[tokio::test]
async fn quiet_servo_acknowledges_nothing() {
    let mut servo = VirtualServo::new(1, 0x000c);
    servo.set(registers::STATUS_RETURN_LEVEL, 1);
    let (_, bus) = setup([servo]);
    let servo = bus.servo(1).unwrap();

    // reads still answer, writes time out
    assert_eq!(servo.read(registers::LED).await.unwrap(), 0);
    assert!(matches!(servo.write(registers::LED, 1).await, Err(Error::Frame(FrameError::Timeout))));
    assert_eq!(servo.read(registers::LED).await.unwrap(), 1);
}
