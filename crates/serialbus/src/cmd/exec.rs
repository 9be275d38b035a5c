use serialbus::frame::Command;

use crate::cmd::{release, ConnectionArgs, ExecArgs};
use crate::exit::{command_error, CliError, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: ExecArgs, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let command = resolve_command(&args.command)?;
    let payload = resolve_payload(&args)?;

    let (shared, socket) = connection.open()?;
    let result = command.execute(&socket, args.address, &payload);
    release(&shared);

    let reply = result.map_err(|err| {
        command_error(&format!("{command} on node {} failed", args.address), err)
    })?;
    if command.expects_reply() {
        print_reply(command, args.address, &reply, format);
    }
    Ok(SUCCESS)
}

fn resolve_command(input: &str) -> CliResult<&'static Command> {
    let by_opcode = || {
        let hex = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))?;
        u8::from_str_radix(hex, 16).ok()
    };
    Command::from_name(input)
        .or_else(|| by_opcode().and_then(Command::from_opcode))
        .ok_or_else(|| {
            CliError::usage(format!(
                "unknown command '{input}' (see `serialbus commands`)"
            ))
        })
}

fn resolve_payload(args: &ExecArgs) -> CliResult<Vec<u8>> {
    if let Some(payload) = &args.payload {
        let compact: String = payload.split_whitespace().collect();
        return hex::decode(compact)
            .map_err(|err| CliError::usage(format!("--payload is not valid hex: {err}")));
    }
    if let Some(text) = &args.text {
        return Ok(text.as_bytes().to_vec());
    }
    Ok(Vec::new())
}
