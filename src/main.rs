use clap::Parser;
use miette::Result;
use tbt::cli::{Cli, Commands};
use tbt::core::logging;
use tbt::core::project::Project;
use tbt::core::Config;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior so piping to `head` exits quietly
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let project = Project::locate(global.project.as_deref()).ok();
    let config = Config::load(project.as_ref());
    logging::init(config.log_level(), global.verbose);

    match cli.command {
        Commands::Init(args) => tbt::cli::commands::init::run(args),
        Commands::Flow(cmd) => tbt::cli::commands::flow::run(cmd, &global),
        Commands::Batch(cmd) => tbt::cli::commands::batch::run(cmd, &global),
        Commands::Report(cmd) => tbt::cli::commands::report::run(cmd, &global),
        Commands::Completions(args) => tbt::cli::commands::completions::run(args),
    }
}
