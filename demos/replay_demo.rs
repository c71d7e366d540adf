//! Replay a short scripted session and print each response

use chrono::{Duration, TimeZone, Utc};
use vibeflow::clock::ManualClock;
use vibeflow::schema::Command;
use vibeflow::scorer::NoJitter;
use vibeflow::store::MemoryStore;
use vibeflow::types::SubChange;
use vibeflow::{FlowConfig, FlowSession, HostEvent};

fn main() {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    let mut session = FlowSession::with_parts(
        FlowConfig::default(),
        Box::new(clock.clone()),
        Box::new(NoJitter),
        Box::new(MemoryStore::new()),
    )
    .unwrap();

    let mut script = vec![HostEvent::command(start, Command::ToggleAssist)];
    for i in 0..20 {
        script.push(HostEvent::text_change(
            start + Duration::seconds(i * 2),
            vec![SubChange::new("let ", 0)],
        ));
    }
    script.push(HostEvent::text_change(
        start + Duration::seconds(41),
        vec![SubChange::new("fn generated() {\n    todo!()\n}\n", 0)],
    ));
    script.push(HostEvent::tick(start + Duration::seconds(42)));
    script.push(HostEvent::focus(start + Duration::seconds(43), false));
    for i in 0..5 {
        script.push(HostEvent::tick(start + Duration::seconds(44 + i)));
    }

    for event in &script {
        clock.set(event.timestamp);
        match session.handle(event) {
            Ok(response) => println!("{}", serde_json::to_string(&response).unwrap()),
            Err(e) => eprintln!("Error: {e:?}"),
        }
    }
}
