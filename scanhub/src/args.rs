//! Controller arguments: pick targets with `--vpn-type`, switch the verb
//! with `--stop` / `--status`.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CtlArgs {
    pub vpn_type: Option<String>,
    pub stop: bool,
    pub status: bool,
}

pub fn usage(prog: &str) -> String {
    format!("Usage: {prog} --vpn-type=<name|all> [--stop] | --status")
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CtlArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "scanhub".into());
    let mut parsed = CtlArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--vpn-type" | "-t" => parsed.vpn_type = it.next(),
            "--stop" => parsed.stop = true,
            "--status" => parsed.status = true,
            _ if arg.starts_with("--vpn-type=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.vpn_type = Some(v.to_string());
                    }
                }
            }
            _ => return Err(format!("Unexpected argument '{arg}'. {}", usage(&prog))),
        }
    }
    Ok(parsed)
}
