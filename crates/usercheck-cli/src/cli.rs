use clap::{ArgAction, Args, Parser, Subcommand};
use usercheck_policy::{AttributeMatch, ScopeMode, TemplateMatch};
use usercheck_reconcile::{CheckOptions, ConnectionOverrides};

#[derive(Parser)]
#[command(
    name = "usercheck",
    about = "usercheck: check directory accounts against declared templates, tags and permissions",
    version
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a directory file holding one administrative account
    Init {
        /// Directory file to create
        path: String,

        /// Administrative account
        #[arg(long, default_value = "root")]
        user: String,

        /// Administrative secret (generated and printed when omitted)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Check accounts against a document without changing anything
    Check(RunArgs),

    /// Show the operations an apply would issue, without issuing them
    Plan(RunArgs),

    /// Check accounts and converge every mismatch
    Apply(RunArgs),

    /// List accounts under a prefix
    List {
        /// Account prefix
        prefix: String,

        /// List accounts below the prefix instead of the prefix itself
        #[arg(long)]
        descendants: bool,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Check document (JSON, or TOML with a .toml extension)
    pub document: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Template match for checks that do not set one: exact, subsequence or any
    #[arg(long)]
    pub template_match: Option<TemplateMatch>,

    /// Same as --template-match subsequence
    #[arg(long)]
    pub allow_extra_templates: bool,

    /// Tag match for checks that do not set one: strict or permissive
    #[arg(long)]
    pub tag_match: Option<AttributeMatch>,

    /// Same as --tag-match strict
    #[arg(long)]
    pub no_extra_tags: bool,

    /// Permission match for checks that do not set one: strict or permissive
    #[arg(long)]
    pub permission_match: Option<AttributeMatch>,

    /// Same as --permission-match strict
    #[arg(long)]
    pub no_extra_permissions: bool,

    /// Create missing target accounts (apply only, exact scope only)
    #[arg(long)]
    pub create_missing: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Options that override the document's own `opts`.
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            template_match: self.template_match,
            allow_extra_templates: self.allow_extra_templates.then_some(true),
            tag_match: self.tag_match,
            no_extra_tags: self.no_extra_tags.then_some(true),
            permission_match: self.permission_match,
            no_extra_permissions: self.no_extra_permissions.then_some(true),
            create_missing: self.create_missing.then_some(true),
        }
    }
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Directory endpoint (path or file:// URL)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Account to authenticate as
    #[arg(long)]
    pub user: Option<String>,

    /// Secret for --user
    #[arg(long, env = "USERCHECK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

impl ConnectionArgs {
    pub fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            endpoint: self.endpoint.clone(),
            user: self.user.clone(),
            secret: self.secret.clone(),
        }
    }
}

pub fn scope_of(descendants: bool) -> ScopeMode {
    if descendants {
        ScopeMode::DescendantsOnly
    } else {
        ScopeMode::ExactAccountOnly
    }
}
