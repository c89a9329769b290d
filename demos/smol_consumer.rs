use futures::StreamExt;
use macro_rules_attribute::apply;
use periodic::{TaskFn, background};
use smol::Timer;
use smol_macros::{Executor, main};
use std::time::Duration;

#[apply(main!)]
async fn main(ex: &Executor<'_>) {
    // A zero period disables the job entirely.
    assert!(background(Duration::ZERO, TaskFn(|| Ok::<_, String>(()))).is_none());

    let mut errors = background(
        Duration::from_millis(300),
        TaskFn(|| {
            println!("Flushing buffers");
            Err::<(), _>("flush target unavailable")
        }),
    )
    .expect("period is positive");

    // The error stream is a plain `Stream`, so any executor can drive it.
    ex.spawn(async move {
        while let Some(result) = errors.next().await {
            println!("Flush result: {result:?}");
        }
    })
    .detach();

    Timer::after(Duration::from_secs(2)).await;
}
