//! Poller behavior for axis-scoped profiles, scripted as a two-channel
//! E-816.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use motor_core::{AxisConversion, MotorError, MotorParam};
use motor_hardware::profiles::E816;
use motor_hardware::{
    mock_serial, AxisConfig, Controller, ControllerRegistry, MoveSpeed, PollSettings,
    TransactionSettings,
};
use tokio::time::timeout;

#[derive(Debug)]
struct Channel {
    on_target: bool,
    overflow: bool,
    servo: bool,
    position: f64,
    /// Answer ONT? with junk to force a decode failure.
    garble: bool,
}

#[derive(Clone)]
struct Device {
    channels: Arc<Mutex<Vec<Channel>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Device {
    fn new(count: usize) -> Self {
        let channels = (0..count)
            .map(|_| Channel {
                on_target: true,
                overflow: false,
                servo: true,
                position: 0.0,
                garble: false,
            })
            .collect();
        Self {
            channels: Arc::new(Mutex::new(channels)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn set(&self, index: usize, f: impl FnOnce(&mut Channel)) {
        let mut channels = self.channels.lock().expect("channel mutex poisoned");
        f(&mut channels[index]);
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("command mutex poisoned").clone()
    }

    /// Wait until the serve task has recorded at least `count` commands;
    /// written bytes are consumed asynchronously.
    async fn wait_for_commands(&self, count: usize) -> Vec<String> {
        timeout(Duration::from_secs(10), async {
            loop {
                let commands = self.commands();
                if commands.len() >= count {
                    return commands;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("scripted device never received the expected commands")
    }

    fn handle(&self, request: &str) -> Vec<String> {
        if request == "*IDN?" {
            return vec!["(c)2004 PI GmbH, E-816, 0, 2.30".to_string()];
        }
        if let Some((query, channel)) = request.split_once(' ') {
            let index = match channel {
                "A" => Some(0),
                "B" => Some(1),
                _ => None,
            };
            if let Some(index) = index {
                let channels = self.channels.lock().expect("channel mutex poisoned");
                let ch = &channels[index];
                let flag = |b: bool| if b { "1" } else { "0" }.to_string();
                match query {
                    "ONT?" if ch.garble => return vec!["X".to_string()],
                    "ONT?" => return vec![flag(ch.on_target)],
                    "OVF?" => return vec![flag(ch.overflow)],
                    "SVO?" => return vec![flag(ch.servo)],
                    "POS?" => return vec![format!("{:.4}", ch.position)],
                    _ => {}
                }
            }
        }
        self.commands
            .lock()
            .expect("command mutex poisoned")
            .push(request.to_string());
        vec![]
    }
}

async fn connect() -> (Arc<Controller>, Device) {
    let (port, harness) = mock_serial::new();
    let device = Device::new(2);
    let served = device.clone();
    harness.serve("\n", move |request| served.handle(request));

    let axes = vec![
        AxisConfig {
            name: "A".to_string(),
            conversion: AxisConversion::default(),
            home_forwards: true,
        },
        AxisConfig {
            name: "B".to_string(),
            conversion: AxisConversion::default(),
            home_forwards: true,
        },
    ];

    let controller = Controller::connect_with(
        3,
        Arc::new(E816),
        Box::new(port),
        axes,
        PollSettings::default(),
        TransactionSettings {
            reply_timeout: Duration::from_secs(1),
            max_read_attempts: 3,
        },
    )
    .await
    .expect("discovery handshake failed");

    (controller, device)
}

#[tokio::test(start_paused = true)]
async fn each_axis_is_polled_with_its_own_queries() {
    let (controller, device) = connect().await;
    device.set(0, |ch| ch.position = 17.25);
    device.set(1, |ch| {
        ch.position = -3.5;
        ch.on_target = false;
    });

    controller.start_poller();
    let registry = {
        let mut r = ControllerRegistry::new();
        r.register(Arc::clone(&controller)).unwrap();
        r
    };
    let a = registry.open(3, 0).unwrap();
    let b = registry.open(3, 1).unwrap();

    let mut events_b = b.subscribe();
    timeout(Duration::from_secs(10), async {
        loop {
            let event = events_b.recv().await.expect("event channel closed");
            if event.snapshot.moving {
                break;
            }
        }
    })
    .await
    .expect("channel B never reported motion");

    let snap_a = a.snapshot().await;
    assert!(snap_a.done);
    assert_eq!(snap_a.position, 17.25);
    // No home switch: a settled channel reads as homed.
    assert!(snap_a.homed);

    let snap_b = b.snapshot().await;
    assert!(snap_b.moving);
    assert_eq!(snap_b.position, -3.5);
}

#[tokio::test(start_paused = true)]
async fn one_failing_channel_does_not_poison_the_other() {
    let (controller, device) = connect().await;
    device.set(0, |ch| ch.position = 5.0);
    // Channel B answers ONT? with junk: its decode fails, A's must not.
    device.set(1, |ch| ch.garble = true);
    controller.start_poller();
    let registry = {
        let mut r = ControllerRegistry::new();
        r.register(Arc::clone(&controller)).unwrap();
        r
    };
    let a = registry.open(3, 0).unwrap();
    let b = registry.open(3, 1).unwrap();

    let mut events_b = b.subscribe();
    timeout(Duration::from_secs(10), async {
        loop {
            let event = events_b.recv().await.expect("event channel closed");
            if event.snapshot.comm_error {
                break;
            }
        }
    })
    .await
    .expect("channel B never flagged the bad payload");

    let snap_a = a.snapshot().await;
    assert!(!snap_a.comm_error);
    assert_eq!(snap_a.position, 5.0);
}

#[tokio::test(start_paused = true)]
async fn servo_off_and_overflow_surface_on_the_snapshot() {
    let (controller, device) = connect().await;
    device.set(0, |ch| {
        ch.servo = false;
        ch.overflow = true;
    });
    controller.start_poller();
    let registry = {
        let mut r = ControllerRegistry::new();
        r.register(Arc::clone(&controller)).unwrap();
        r
    };
    let a = registry.open(3, 0).unwrap();

    let mut events = a.subscribe();
    let event = timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if event.snapshot.fault {
                return event;
            }
        }
    })
    .await
    .expect("fault never surfaced");

    assert!(!event.snapshot.power_on);
    assert!(event.snapshot.high_limit);
}

#[tokio::test(start_paused = true)]
async fn unsupported_motions_are_rejected_locally() {
    let (controller, device) = connect().await;
    let registry = {
        let mut r = ControllerRegistry::new();
        r.register(Arc::clone(&controller)).unwrap();
        r
    };
    let a = registry.open(3, 0).unwrap();

    assert!(matches!(
        a.home(None, MoveSpeed::default()).await.unwrap_err(),
        MotorError::NotSupported("home")
    ));
    assert!(matches!(
        a.jog(1.0, None).await.unwrap_err(),
        MotorError::NotSupported("jog")
    ));
    assert!(matches!(
        a.set_parameter(MotorParam::HighLimit, 10.0)
            .await
            .unwrap_err(),
        MotorError::NotSupported(_)
    ));
    // Give the serve task a chance to drain anything that was written.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(device.commands().is_empty());

    // The one supported parameter goes through.
    a.set_parameter(MotorParam::ClosedLoop, 1.0).await.unwrap();
    assert_eq!(
        device.wait_for_commands(1).await,
        vec!["SVO A 1".to_string()]
    );

    a.move_to(17.25, false, MoveSpeed::default()).await.unwrap();
    assert!(!a.snapshot().await.done);
}
