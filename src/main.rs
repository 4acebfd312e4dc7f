use fibble::cli::{parse_cli, run};
use fibble::logging;

fn main() {
    logging::init();
    let cli = parse_cli();
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
