use playthru::{PlaythruEngine, StreamDesc};
use std::time::Duration;

/// Mic-to-speaker play-through on the default devices. Prints dropout
/// events while running; careful with speaker volume, this will feed back.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let desc = StreamDesc::default();
    println!(
        "Starting play-through: {} Hz, {} channels, {} ms latency",
        desc.sample_rate,
        desc.channels,
        desc.latency.as_millis()
    );

    let mut engine = PlaythruEngine::new(desc)?;
    let events = engine.events();
    engine.start()?;

    let run_for = Duration::from_secs(10);
    let deadline = std::time::Instant::now() + run_for;
    while std::time::Instant::now() < deadline {
        while let Ok(event) = events.try_recv() {
            if event.is_error() {
                println!("dropout: {:?}", event);
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    engine.stop()?;

    let stats = engine.stats();
    println!(
        "captured {} frames, rendered {} frames, {} dropout(s), {} rejected store(s)",
        stats.frames_captured,
        stats.frames_rendered,
        stats.dropouts(),
        stats.rejected_stores
    );
    Ok(())
}
