use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use handoff_core::{
    DeferredTask, EngineBuilder, EngineConfig, HandoffError, InitOnce, ReadinessGate, launch,
};

fn factorial(n: u64) -> u64 {
    let res = (1..=n).product();
    log::info!("factorial({n}) = {res}");
    res
}

fn divide(num: i32, den: i32) -> Result<i32, String> {
    if den == 0 {
        return Err(format!("Illegal division by 0: {num} / {den}"));
    }
    Ok(num / den)
}

/// HANDOFF_CONFIG (JSON ファイル) → HANDOFF_WORKERS の順に上書き
fn load_config() -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match std::env::var("HANDOFF_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            EngineConfig::from_json_str(&raw)?
        }
        Err(_) => EngineConfig::default(),
    };
    if let Ok(workers) = std::env::var("HANDOFF_WORKERS") {
        config.workers = workers.parse()?;
    }
    Ok(config)
}

fn show<T: std::fmt::Debug>(label: &str, result: Result<T, HandoffError>) {
    match result {
        Ok(v) => println!("{label} = {v:?}"),
        Err(e) => println!("{label} -> {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // (A) Engine を起動（queue + workers）
    let config = load_config()?;
    println!("config: {}", serde_json::to_string(&config)?);
    let engine = EngineBuilder::from_config(config).build()?;

    // (B) 事前に作った DeferredTask を queue に投入し、handle だけ手元に残す
    let (task, mut fact) = DeferredTask::new(|| factorial(6));
    let id = engine.queue().submit(task)?;
    println!("submitted {id}");
    show("factorial(6)", fact.wait());

    // (C) 失敗は channel 経由で consumer 側に届く
    for (num, den) in [(20, 0), (20, 10)] {
        let mut quotient = engine.submit_fallible(move || divide(num, den))?;
        show(&format!("{num} / {den}"), quotient.wait());
    }

    // (D) 二つの結果を async 側で同時に待つ（どちらが先に終わっても良い）
    let product = engine.submit(|| 20 * 10)?;
    let quotient = engine.submit_fallible(|| divide(20, 10))?;
    let (product, quotient) = tokio::join!(product.wait_async(), quotient.wait_async());
    show("20 * 10", product);
    show("20 / 10", quotient);

    // (E) ReadinessGate: 値を伴わない通知
    let gate = Arc::new(ReadinessGate::new());
    let waiter = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            println!("waiting for work ...");
            gate.wait_until_ready();
            println!("processing shared data ... work done");
        })
    };
    thread::sleep(Duration::from_millis(10));
    println!("sender: data is ready");
    gate.set_ready();
    waiter.join().map_err(|_| "gate waiter panicked")?;

    // (F) InitOnce: 何スレッドから呼んでも同じインスタンス
    let instance: Arc<InitOnce<String>> = Arc::new(InitOnce::new());
    let callers: Vec<_> = (0..3)
        .map(|_| {
            let instance = Arc::clone(&instance);
            thread::spawn(move || {
                let value = instance.get_or_init(|| "the only instance".to_string());
                value as *const String as usize
            })
        })
        .collect();
    for caller in callers {
        let addr = caller.join().map_err(|_| "init caller panicked")?;
        println!("instance at {addr:#x}");
    }

    // (G) eager と lazy の違い
    let begin = Instant::now();
    let mut lazy_at = launch::lazy(Instant::now);
    let mut eager_at = launch::spawn(Instant::now)?;
    thread::sleep(Duration::from_millis(100));
    println!(
        "lazy evaluated after {:?}, eager evaluated after {:?}",
        lazy_at.wait()? - begin,
        eager_at.wait()? - begin
    );

    // (H) graceful shutdown
    let queue = engine.queue().clone();
    engine.shutdown()?;
    println!("counts: {}", serde_json::to_string(&queue.counts())?);
    Ok(())
}
