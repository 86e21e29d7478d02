//! tests against a real servo, plugged on `DXL_PORT` with identifier `DXL_ID` (default 1)

use std::{
    env,
    sync::Arc,
    time::Duration,
    };
use futures_concurrency::future::Join;
use serial_test::serial;

use dynabus::{
    registers,
    master::*,
    };


fn test<T, F>(test: T)
where
    T: FnOnce(Arc<Bus<SerialLink>>, u8) -> F,
    F: Future,
{
    let _ = env_logger::builder().is_test(true).try_init();
    tokio::runtime::Runtime::new()
    .expect("failed to create runtime")
    .block_on(async move {
        let settings = Settings::from_env().expect("invalid settings");
        let id = env::var("DXL_ID").ok()
            .and_then(|id| id.parse().ok())
            .unwrap_or(1);
        let bus = Arc::new(Bus::open(&settings).expect("failed to open bus"));
        tokio::time::timeout(Duration::from_secs(10), test(bus, id))
            .await.expect("aborted test because took too long");
    });
}


#[test]
#[serial]
fn model_number() {
    test(|bus, id| async move {
        let model = bus.servo(id).unwrap().model().await.unwrap();
        assert!(model.name().is_some(), "unknown model {}", model);
    });
}

#[test]
#[serial]
fn repeated_reads() {
    test(|bus, id| async move {
        let servo = bus.servo(id).unwrap();
        for _ in 0 .. 100 {
            let position = servo.read(registers::PRESENT_POSITION).await.unwrap();
            assert!(position <= registers::AX_RESOLUTION);
        }
    });
}

#[test]
#[serial]
fn concurrent_reads() {
    test(|bus, id| async move {
        let servo = bus.servo(id).unwrap();
        let (model, feedback, level) = (
            servo.model(),
            servo.feedback(),
            servo.read(registers::STATUS_RETURN_LEVEL),
            ).join().await;
        model.unwrap();
        assert!(feedback.unwrap().voltage > 0);
        assert!(level.unwrap() <= 2);
    });
}

#[test]
#[serial]
fn absent_servo() {
    test(|bus, id| async move {
        let absent = if id == 0 {1} else {id - 1};
        let error = bus.servo(absent).unwrap().model().await.unwrap_err();
        assert!(error.is_unreachable(), "unexpected {:?}", error);
        // the line recovers immediately
        bus.servo(id).unwrap().model().await.unwrap();
    });
}

#[test]
#[serial]
fn torque_round_trip() {
    test(|bus, id| async move {
        let servo = bus.servo(id).unwrap();
        servo.set_torque(true).await.unwrap();
        assert_eq!(servo.read(registers::TORQUE_ENABLE).await.unwrap(), 1);
        bus.broadcast().set_torque(false).await.unwrap();
        assert_eq!(servo.read(registers::TORQUE_ENABLE).await.unwrap(), 0);
    });
}

#[test]
#[serial]
fn long_writes_are_drained() {
    test(|bus, id| async move {
        // goal position, moving speed and torque limit written back unchanged
        let current = bus.read_register(id, 30, 6).await.unwrap();
        for _ in 0 .. 20 {
            // the answer only comes if the release waited for the last byte
            assert_eq!(bus.write_register(id, 30, &current).await.unwrap(), Acknowledge::Accepted);
        }
        assert_eq!(bus.read_register(id, 30, 6).await.unwrap(), current);
    });
}
