//! Default worker binary. Runs shell targets; function targets need a worker
//! binary that registers them and calls [`nodequeue::worker::main_with`].

use nodequeue::worker::{main_with, FunctionRegistry};

fn main() {
    main_with(FunctionRegistry::new());
}
