fn main() {
    if let Err(err) = ci_reconcile::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
