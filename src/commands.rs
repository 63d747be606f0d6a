//! Command-line interface of `drq`.
//!
//! ```text
//! drq ask "How many doctors work in Cardiology?"
//! drq interactive -s ward-review
//! drq schema
//! drq analyze "SELECT * FROM patients"
//! drq init
//! ```

use clap::{Parser, Subcommand};

/// Ask questions about a MySQL database in plain language.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Ask a single question and print the answer.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question, in plain language.
        question: Option<String>,

        /// Named session to resume and record into.
        #[arg(name = "session", short = 's')]
        session: Option<String>,

        /// Print the SQL behind the answer.
        #[arg(long = "show-sql")]
        show_sql: bool,
    },

    /// Chat with the database until `exit`.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        /// Named session to resume and record into.
        #[arg(name = "session", short = 's')]
        session: Option<String>,
    },

    /// Write a default config and prompt template.
    Init,

    /// Print the schema description sent to the model.
    Schema,

    /// Statically analyze a SQL statement without running it.
    #[clap(name = "analyze", alias = "x")]
    Analyze {
        sql: String,
    },
}
