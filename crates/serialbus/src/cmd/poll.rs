use std::sync::Arc;

use serialbus::binding::{BindingError, Item, ItemPath};
use serialbus::poller::Poller;
use tracing::{info, warn};

use crate::cmd::{release, ConnectionArgs, PollArgs};
use crate::exit::{binding_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_reading, OutputFormat};

pub fn run(args: PollArgs, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let items = parse_items(&args.items)?;
    let (shared, socket) = connection.open()?;

    let stop = Arc::clone(&shared);
    ctrlc::set_handler(move || {
        info!("interrupt received, closing connection");
        if let Err(err) = stop.shutdown() {
            warn!(error = %err, "failed to close connection");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("failed to install signal handler: {err}")))?;

    let max_rounds = args
        .count
        .map(|count| usize::try_from(count).unwrap_or(usize::MAX));
    let poller = Poller::new(socket, items).with_refresh(args.refresh);
    poller.run(max_rounds, |reading| print_reading(reading, format));

    release(&shared);
    Ok(SUCCESS)
}

/// Parse every `--item` and check its path up front.
fn parse_items(specs: &[String]) -> CliResult<Vec<Item>> {
    specs
        .iter()
        .map(|spec| {
            let item = Item::parse(spec)?;
            ItemPath::parse(&item.binding.path)?;
            Ok::<_, BindingError>(item)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| binding_error("invalid --item", err))
}

#[cfg(test)]
mod tests {
    use serialbus::binding::ItemCommand;

    use super::*;

    #[test]
    fn parses_items() {
        let items = parse_items(&[
            "kitchen:getValue=/sensor3/radiatorTemperature".to_string(),
            "hall:setValue=/sensor4/radiatorTemperature".to_string(),
        ])
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].binding.command, ItemCommand::SetValue);
    }

    #[test]
    fn rejects_bad_paths_before_connecting() {
        let err = parse_items(&["kitchen:getValue=/node3/radiatorTemperature".to_string()])
            .unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
        assert!(err.message.contains("failed to parse path"));
    }
}
