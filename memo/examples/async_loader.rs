use fibre_memo::MemoBuilder;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
  let exchange_rate = Arc::new(
    MemoBuilder::new()
      .time_to_live(Duration::from_secs(30))
      .build_async(|(from, to): (String, String)| async move {
        println!("  (fetching {}/{} from the remote service...)", from, to);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, Infallible>(if from == to { 1.0 } else { 1.08 })
      })
      .expect("Failed to build memoized function"),
  );

  // Ten concurrent requests for the same pair share one remote call.
  let mut handles = Vec::new();
  for i in 0..10 {
    let exchange_rate = exchange_rate.clone();
    handles.push(tokio::spawn(async move {
      let rate = exchange_rate
        .call(("EUR".to_string(), "USD".to_string()))
        .await
        .expect("rate lookup cannot fail");
      println!("Request {} got rate {}", i, rate);
    }));
  }
  for handle in handles {
    handle.await.expect("request task panicked");
  }

  let stats = exchange_rate.stats();
  println!(
    "\nmisses: {}, joined in-flight: {}, hits: {}",
    stats.misses, stats.deduped_waits, stats.hits
  );
}
