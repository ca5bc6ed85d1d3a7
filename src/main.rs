fn main() {
    std::process::exit(formbridge::cli::run());
}
