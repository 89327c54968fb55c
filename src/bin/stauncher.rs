use anyhow::Result;

fn main() -> Result<()> {
    staunch::cli::run(staunch::cli::CliMode::Launch)
}
