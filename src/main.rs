fn main() {
    if let Err(err) = market_fields::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
