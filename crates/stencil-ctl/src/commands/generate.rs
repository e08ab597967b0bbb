//! `generate`: compile one template, apply properties, run it once.

use tracing::info;

use super::{base_properties, Session};
use crate::cli_config::CliConfig;
use crate::GenerateArgs;

pub(crate) fn handle_generate_command(args: GenerateArgs, config: &CliConfig) -> anyhow::Result<()> {
    let mut session = Session::new(&args.run, config);
    let properties = base_properties(&args.run)?;

    let mut runner = session.load(&args.template)?;
    runner.set_properties(&properties)?;
    let text = runner.run()?;
    runner.release();

    info!(template = %args.template.display(), bytes = text.len(), "generated");
    session.write(&text, args.run.out.as_deref())
}
