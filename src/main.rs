fn main() {
    if let Err(err) = formdiff::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
