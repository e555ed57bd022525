//! Runs a named allocation scenario against a fresh simulated memory space
//! and prints both range lists after every step.

use std::io::Read;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use rangealloc::{AddressRange, AllocError, FreeListAllocator, RangeList};

#[derive(Debug, Parser)]
#[command(name = "memspace")]
#[command(about = "Step through first-fit allocation scenarios on a simulated address space")]
struct Cli {
  /// Scenario to run.
  #[arg(value_enum)]
  scenario: Scenario,
  /// Size of the managed space, in words.
  #[arg(long, default_value_t = 100)]
  max_size: usize,
  /// Wait for ENTER between steps.
  #[arg(long)]
  step: bool,
  /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` applies otherwise.
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
  /// Split free space with a few allocations.
  Malloc,
  /// Allocate, then release in a different order.
  Free,
  /// Fragment the space, fail a large request, compact and retry.
  Defrag,
  /// Ask for more than the space holds.
  Exhaustion,
  /// Show that list order, not address order, picks the range.
  FirstFit,
  /// Exercise the range list on its own.
  ListOps,
}

struct Runner {
  step: bool,
  counter: usize,
}

impl Runner {
  fn show(
    &mut self,
    label: &str,
    allocator: &FreeListAllocator,
  ) {
    self.counter += 1;
    println!("\n[{}] {}", self.counter, label);
    println!("{allocator}");
    println!(
      "    free words = {}, allocated words = {}, largest free = {}",
      allocator.free_words(),
      allocator.allocated_words(),
      allocator.largest_free()
    );
    self.pause();
  }

  /// Waits until the user presses ENTER, when stepping is enabled.
  fn pause(&self) {
    if self.step {
      println!("\n>>> Press ENTER to continue...");
      let _ = std::io::stdin().bytes().next();
    }
  }
}

fn init_logging(verbose: u8) {
  let mut builder = env_logger::Builder::from_default_env();
  match verbose {
    0 => {}
    1 => {
      builder.filter_level(LevelFilter::Debug);
    }
    _ => {
      builder.filter_level(LevelFilter::Trace);
    }
  }
  let _ = builder.try_init();
}

fn report(
  label: &str,
  result: Result<usize, AllocError>,
) -> Option<usize> {
  match result {
    Ok(address) => {
      println!("    {label} -> address {address}");
      Some(address)
    }
    Err(error) => {
      println!("    {label} -> {error}");
      None
    }
  }
}

fn run_malloc(
  runner: &mut Runner,
  max_size: usize,
) -> Result<(), AllocError> {
  let mut allocator = FreeListAllocator::new(max_size)?;
  runner.show("fresh memory space", &allocator);

  for length in [17, 3, 10] {
    report(&format!("allocate({length})"), allocator.allocate(length));
    runner.show(&format!("after allocate({length})"), &allocator);
  }

  Ok(())
}

fn run_free(
  runner: &mut Runner,
  max_size: usize,
) -> Result<(), AllocError> {
  let mut allocator = FreeListAllocator::new(max_size)?;
  let addresses: Vec<usize> = [10, 20, 5].iter().filter_map(|&length| report(&format!("allocate({length})"), allocator.allocate(length))).collect();
  runner.show("three allocations", &allocator);

  for &address in addresses.iter().rev() {
    allocator.release(address);
    runner.show(&format!("after release({address})"), &allocator);
  }

  allocator.release(max_size + 1);
  runner.show(&format!("after release({}) of an unknown address", max_size + 1), &allocator);

  Ok(())
}

fn run_defrag(
  runner: &mut Runner,
  max_size: usize,
) -> Result<(), AllocError> {
  let mut allocator = FreeListAllocator::new(max_size)?;
  let chunk = (max_size / 4).max(1);

  let mut addresses = Vec::new();
  while let Ok(address) = allocator.allocate(chunk) {
    addresses.push(address);
  }
  for &address in &addresses {
    allocator.release(address);
  }
  runner.show("space fully released in chunks, not yet merged", &allocator);

  report(&format!("allocate({max_size})"), allocator.allocate(max_size));
  runner.show("large request without compaction", &allocator);

  allocator.compact();
  runner.show("after compact()", &allocator);

  report(&format!("allocate({max_size})"), allocator.allocate(max_size));
  runner.show("large request after compaction", &allocator);

  Ok(())
}

fn run_exhaustion(
  runner: &mut Runner,
  max_size: usize,
) -> Result<(), AllocError> {
  let mut allocator = FreeListAllocator::new(max_size)?;

  report(&format!("allocate({})", max_size + 1), allocator.allocate(max_size + 1));
  runner.show("oversized request leaves the free list untouched", &allocator);

  report(&format!("allocate({max_size})"), allocator.allocate(max_size));
  report("allocate(1)", allocator.allocate(1));
  runner.show("space exhausted", &allocator);

  Ok(())
}

fn run_first_fit(runner: &mut Runner) -> Result<(), AllocError> {
  // Free ranges of lengths 5, 10 and 3, listed in that order.
  let free: RangeList = [(0, 5), (10, 10), (25, 3)].into_iter().map(|(base, length)| AddressRange::new(base, length)).collect::<Result<_, _>>()?;
  let allocated: RangeList = [(5, 5), (20, 5)].into_iter().map(|(base, length)| AddressRange::new(base, length)).collect::<Result<_, _>>()?;

  let mut allocator = FreeListAllocator::from_lists(28, free, allocated)?;
  runner.show("hand-built memory space", &allocator);

  report("allocate(4)", allocator.allocate(4));
  runner.show("the first range long enough was split", &allocator);

  Ok(())
}

fn run_list_ops(runner: &Runner) -> Result<(), AllocError> {
  let mut list = RangeList::new();
  let a = list.push_back(AddressRange::new(0, 5)?);
  list.push_back(AddressRange::new(5, 5)?);
  list.push_front(AddressRange::new(20, 5)?);
  println!("\n    built:                {list}");

  if let Err(error) = list.insert(1, AddressRange::new(10, 5)?) {
    println!("    insert(1) failed: {error}");
  }
  println!("    after insert(1):      {list}");

  let probe = AddressRange::new(5, 5)?;
  println!("    index_of{probe}:      {:?}", list.index_of(&probe));

  match list.remove_entry(a) {
    Ok(range) => println!("    removed entry {range}"),
    Err(error) => println!("    remove_entry failed: {error}"),
  }
  match list.remove_entry(a) {
    Ok(range) => println!("    removed entry {range} twice?"),
    Err(error) => println!("    removing it again: {error}"),
  }
  match list.get(list.len()) {
    Ok(entry) => println!("    get(len) = {}", entry.range()),
    Err(error) => println!("    get(len): {error}"),
  }
  println!("    final:                {list}");
  runner.pause();

  Ok(())
}

fn main() -> Result<(), AllocError> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let mut runner = Runner {
    step: cli.step,
    counter: 0,
  };

  match cli.scenario {
    Scenario::Malloc => run_malloc(&mut runner, cli.max_size),
    Scenario::Free => run_free(&mut runner, cli.max_size),
    Scenario::Defrag => run_defrag(&mut runner, cli.max_size),
    Scenario::Exhaustion => run_exhaustion(&mut runner, cli.max_size),
    Scenario::FirstFit => run_first_fit(&mut runner),
    Scenario::ListOps => run_list_ops(&runner),
  }
}
