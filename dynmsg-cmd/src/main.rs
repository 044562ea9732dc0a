use std::fs;
use std::io::Read;

use dynmsg::message::Message;
use dynmsg::schema::DescriptorParser;
use dynmsg_mutator::{ChaoSampler, Mutator, StdValueMutator};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    version = "0.1.0",
    about = "dynmsg command line tool",
    long_about = "A command line tool for parsing message schemas and running structure-aware mutations."
)]
struct Cmd {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse schema declarations from stdin
    Parse,
    /// Run seeded mutations on a default-initialized message
    Mutate {
        /// Path to the schema file
        #[arg(help = "The path to the schema file containing the message definitions.")]
        schema_file: String,

        /// Name of the message to mutate
        #[arg(help = "The name of the message descriptor to mutate.")]
        message_name: String,

        /// Seed for the mutator (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Number of mutations to apply
        #[arg(long, default_value_t = 16)]
        count: usize,

        /// Size increase hint passed to every mutation
        #[arg(long, default_value_t = 64)]
        size_hint: usize,
    },
    /// Recombine two independently mutated messages
    CrossOver {
        /// Path to the schema file
        #[arg(help = "The path to the schema file containing the message definitions.")]
        schema_file: String,

        /// Name of the message to recombine
        #[arg(help = "The name of the message descriptor to recombine.")]
        message_name: String,

        /// Seed for the mutator (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Number of mutations applied to each message before recombination
        #[arg(long, default_value_t = 16)]
        count: usize,
    },
}

fn load_registry(schema_file: &str) -> Result<DescriptorParser, String> {
    let content = fs::read_to_string(schema_file)
        .map_err(|e| format!("Failed to read schema file: {}", e))?;
    let mut parser = DescriptorParser::new();
    parser.parse_file(&content)?;
    Ok(parser)
}

fn build_message(parser: &DescriptorParser, name: &str, seed: u64) -> Result<Message, String> {
    let descriptor = parser
        .get_descriptor(name)
        .ok_or_else(|| format!("Message '{}' not found in schema file", name))?;
    let mut message = Message::new(descriptor);

    // One initial mutation establishes required fields through the repair
    // pass.
    let mut mutator = Mutator::new(parser, seed);
    mutator.mutate::<ChaoSampler<_>, ChaoSampler<_>, StdValueMutator>(&mut message, 0)?;
    Ok(message)
}

fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            eprintln!("Using random seed: {}", seed);
            seed
        }
    }
}

fn run(cli: Cmd) -> Result<(), String> {
    match cli.command {
        Commands::Parse => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| format!("Failed to read from stdin: {}", e))?;

            let mut parser = DescriptorParser::new();
            parser.parse_file(&input)?;
            println!("{:#?}", parser.enums);
            println!("{:#?}", parser.descriptors);
        }
        Commands::Mutate {
            schema_file,
            message_name,
            seed,
            count,
            size_hint,
        } => {
            let parser = load_registry(&schema_file)?;
            let seed = resolve_seed(seed);
            let mut message = build_message(&parser, &message_name, seed)?;

            let mut mutator = Mutator::new(&parser, seed);
            for step in 0..count {
                mutator.mutate::<ChaoSampler<_>, ChaoSampler<_>, StdValueMutator>(
                    &mut message,
                    size_hint,
                )?;
                println!("{:>4}: {}", step, message);
            }
        }
        Commands::CrossOver {
            schema_file,
            message_name,
            seed,
            count,
        } => {
            let parser = load_registry(&schema_file)?;
            let seed = resolve_seed(seed);

            let mut source = build_message(&parser, &message_name, seed)?;
            let mut target = build_message(&parser, &message_name, seed.wrapping_add(1))?;

            let mut mutator = Mutator::new(&parser, seed);
            for _ in 0..count {
                mutator.mutate::<ChaoSampler<_>, ChaoSampler<_>, StdValueMutator>(
                    &mut source, 64,
                )?;
                mutator.mutate::<ChaoSampler<_>, ChaoSampler<_>, StdValueMutator>(
                    &mut target, 64,
                )?;
            }

            println!("source: {}", source);
            println!("target: {}", target);
            mutator.cross_over(&source, &mut target)?;
            println!("result: {}", target);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cmd::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
