use serialbus::simulator::Simulator;

use crate::cmd::SimulateArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS};

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    if args.nodes.is_empty() {
        return Err(CliError::usage("--nodes must name at least one address"));
    }
    let simulator = Simulator::bind(args.listen.as_str(), &args.nodes)
        .map_err(|err| io_error(&format!("failed to listen on {}", args.listen), err))?;
    let addr = simulator
        .local_addr()
        .map_err(|err| io_error("failed to read listen address", err))?;
    eprintln!("simulating nodes {:?} on {addr}", args.nodes);

    simulator
        .run()
        .map_err(|err| io_error("simulated controller stopped", err))?;
    Ok(SUCCESS)
}
