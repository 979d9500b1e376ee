fn main() -> anyhow::Result<()> {
    intake::cli::main()
}
