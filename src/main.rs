use avalon::cli;
use avalon::extension::Registry;

fn main() {
    let registry = Registry::with_builtins();
    let code = cli::run(&registry, std::env::args());
    std::process::exit(code);
}
