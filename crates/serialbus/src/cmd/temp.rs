use serialbus::frame::{decode_temperature, Command};

use crate::cmd::{release, ConnectionArgs, TempArgs};
use crate::exit::{command_error, CliResult, SUCCESS};
use crate::output::{print_temperature, OutputFormat};

pub fn run(args: TempArgs, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let (shared, socket) = connection.open()?;
    let result = Command::GET_TEMPERATURE.execute(&socket, args.address, &[]);
    release(&shared);

    let context = format!("failed to read temperature from sensor {}", args.address);
    let raw = result.map_err(|err| command_error(&context, err))?;
    let celsius = decode_temperature(&raw).map_err(|err| command_error(&context, err))?;
    print_temperature(args.address, celsius, &raw, format);
    Ok(SUCCESS)
}
