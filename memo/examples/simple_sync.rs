use fibre_memo::MemoBuilder;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct Profile {
  id: u64,
  name: String,
}

fn main() {
  // Memoize a slow lookup: at most 100 profiles, each valid for 2 seconds.
  let profiles = MemoBuilder::new()
    .max_size(100)
    .time_to_live(Duration::from_secs(2))
    .janitor_tick_interval(Duration::from_millis(500))
    .build(|id: u64| {
      println!("  (loading profile {} from the database...)", id);
      thread::sleep(Duration::from_millis(300));
      if id == 0 {
        return Err(format!("no profile with id {}", id));
      }
      Ok(Profile {
        id,
        name: format!("user-{}", id),
      })
    })
    .expect("Failed to build memoized function");

  println!("First call for 42:");
  let profile = profiles.call(42).expect("profile 42 exists");
  println!("Got {:?}", profile);

  println!("\nSecond call for 42 (served from the cache):");
  let again = profiles.call(42).expect("profile 42 exists");
  println!("Got {} ({})", again.name, again.id);

  println!("\nCall for 0 (errors are returned, never cached):");
  match profiles.call(0) {
    Ok(profile) => println!("Unexpected profile: {:?}", profile),
    Err(err) => println!("Error: {}", err),
  }

  println!("\nStats: {:#?}", profiles.stats());

  println!("\nWaiting 3 seconds for the entry to expire...");
  thread::sleep(Duration::from_secs(3));
  println!("Entries left after expiry: {}", profiles.len());

  println!("\nThird call for 42 (recomputed):");
  profiles.call(42).expect("profile 42 exists");
  println!("\nStats: {:#?}", profiles.stats());
}
