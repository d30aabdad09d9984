fn main() -> anyhow::Result<()> {
    hostbench::run()
}
