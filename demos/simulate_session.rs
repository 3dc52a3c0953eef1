//! Run one second of tracking against an in-memory link and print what the
//! companion device receives

use std::sync::Arc;

use synheart_relay::clock::ManualClock;
use synheart_relay::encoder::InboundMessage;
use synheart_relay::transport::MemoryTransport;
use synheart_relay::types::RawHeartRateEvent;
use synheart_relay::{AggregationSession, MotionSensor, RelayConfig, SyncFacade};

struct Accelerometer;

impl MotionSensor for Accelerometer {
    fn is_present(&self) -> bool {
        true
    }

    fn register(&self) -> Result<(), String> {
        Ok(())
    }

    fn unregister(&self) {}
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    let clock = Arc::new(ManualClock::new(0));
    let transport = Arc::new(MemoryTransport::with_peers(&["phone"]));
    let session = match AggregationSession::new(
        RelayConfig::default(),
        transport.clone(),
        clock.clone(),
        runtime.handle().clone(),
    ) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e:?}");
            return;
        }
    };

    session.start(&Accelerometer);
    session.on_heart_rate_event(&RawHeartRateEvent {
        bpm: 68,
        status_code: 1,
        ibi_values: vec![880, 0, 870],
        ibi_statuses: vec![0, 0, 1],
    });

    // 32 Hz for a little over a second: the first full buffer after the
    // interval elapses forms one batch
    for i in 0..40 {
        clock.set(1_000 + i * 31);
        let t = i as f32 / 32.0;
        let admission = session.on_accel_sample(t.sin() * 0.2, t.cos() * 0.2, 9.81);
        if let Some(handle) = admission.dispatched {
            match runtime.block_on(handle) {
                Ok(outcome) => eprintln!("batch outcome: {outcome:?}"),
                Err(e) => eprintln!("Error: {e}"),
            }
        }
    }

    let history = session.history();
    let export = runtime.block_on(SyncFacade::new(transport.clone()).export_history(&history));
    eprintln!("history export: {export:?}");
    session.stop(&Accelerometer);

    for message in transport.sent() {
        match InboundMessage::decode(&message.channel, &message.payload)
            .and_then(|decoded| decoded.to_json_value())
        {
            Ok(json) => println!("{} {json}", message.channel),
            Err(e) => eprintln!("Error: {e:?}"),
        }
    }
}
