use clap::Parser;

/// This is a vote tallying and auditing program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON description of a tally session: candidates, rules,
    /// scripted votes, random votes and an optional candidate to rig the
    /// election for.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference file containing the summary of a session in JSON format.
    /// If provided, votetally will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the session will be
    /// written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (default 3) The number of leading candidates to print after the session.
    #[clap(short, long, value_parser, default_value_t = 3)]
    pub top: usize,

    /// If specified, runs the given number of randomized sessions against a built-in
    /// candidate pool instead of reading a configuration file.
    #[clap(long, value_parser)]
    pub simulate: Option<u32>,

    /// The seed used for random votes and for the randomized sessions. Overrides the
    /// seed that may be specified with the --config option.
    #[clap(long, value_parser)]
    pub seed: Option<u32>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
