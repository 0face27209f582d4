use clap::{Parser, Subcommand};
use inkpress::build::{BuildContext, RunError};
use inkpress::config::{self, ConfigOverrides, SiteEnv};
use inkpress::serve::{self, LoopOptions};
use inkpress::{logger, output};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "inkpress")]
#[command(about = "Incremental static site generator for markdown blogs")]
#[command(long_about = "\
Incremental static site generator for markdown blogs

Articles and pages are markdown files with TOML frontmatter. Templates are
Tera files under web/html; a change to any template rebuilds exactly the
outputs whose templates include it.

Site structure:

  site.toml                        # Optional config (see gen-config)
  content/
  ├── articles/                    # Dated, tagged posts → /<slug>/
  │   └── 2024/hello-world.md      # Media next to a post → /content/images/2024/
  ├── pages/                       # Standalone pages → /<slug>/
  │   └── about.md
  └── images/                      # Site-wide media → /content/images/
  web/
  ├── html/
  │   ├── article.tmpl.html
  │   ├── page.tmpl.html
  │   ├── index.tmpl.html          # Home page
  │   └── tags/
  │       ├── tag.tmpl.html        # One page per tag → /tags/<tag>/
  │       └── tags.tmpl.html       # All tags → /tags/
  ├── javascripts/                 # Linked to /content/javascripts
  └── stylesheets/                 # Linked to /content/stylesheets

Article frontmatter:

  +++
  title = \"Hello\"
  published_at = 2024-03-01T09:00:00Z
  tags = [\"rust\"]
  hook = \"One line of *markdown*.\"
  +++

Run 'inkpress gen-config' to generate a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Output directory, relative to the site root
    #[arg(long, env = "TARGET_DIR", global = true)]
    target_dir: Option<String>,

    /// Absolute URL the site is hosted at
    #[arg(long, env = "ABSOLUTE_URL", global = true)]
    absolute_url: Option<String>,

    /// Number of parallel build workers
    #[arg(long, env = "CONCURRENCY", global = true)]
    concurrency: Option<usize>,

    /// Site environment: development or production
    #[arg(long, env = "SITE_ENV", global = true)]
    env: Option<SiteEnv>,

    /// Log every job, including those with nothing to do
    #[arg(long, short, env = "VERBOSE", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site once
    Build,
    /// Build, then rebuild on every change and serve the output
    Loop {
        /// Port for the development server
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Only watch and rebuild
        #[arg(long)]
        no_serve: bool,
    },
    /// Validate sources and templates without writing output
    Check,
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    let port = match &cli.command {
        Command::Loop { port, .. } => *port,
        _ => None,
    };
    let overrides = ConfigOverrides {
        absolute_url: cli.absolute_url.clone(),
        env: cli.env,
        target_dir: cli.target_dir.clone(),
        concurrency: cli.concurrency,
        port,
    };

    match cli.command {
        Command::Build => {
            let config = config::load_config(&cli.source, &overrides)?;
            let ctx = BuildContext::new(&cli.source, config)?;
            println!("==> Building {}", ctx.root().display());
            match ctx.run() {
                Ok(summary) => output::print_build_summary(&summary),
                Err(RunError::Phase(failure)) => {
                    output::print_phase_failure(&failure);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
            println!("==> Build complete: {}", ctx.target_dir().display());
        }
        Command::Loop { no_serve, .. } => {
            let config = config::load_config(&cli.source, &overrides)?;
            let port = (!no_serve).then_some(config.serve.port);
            let ctx = BuildContext::new(&cli.source, config)?.with_live_reload(!no_serve);
            serve::run_loop(&ctx, &LoopOptions { port })?;
        }
        Command::Check => {
            let config = config::load_config(&cli.source, &overrides)?;
            let ctx = BuildContext::new(&cli.source, config)?;
            println!("==> Checking {}", ctx.root().display());
            match ctx.check() {
                Ok(report) => output::print_check_report(&report),
                Err(RunError::Phase(failure)) => {
                    output::print_phase_failure(&failure);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
            println!("==> Site is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(ExitCode::SUCCESS)
}
