use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::LazyLock,
};

use {
    anyhow::Context,
    lexopt::{Arg, Parser, ValueExt},
    regex::Regex,
};

pub mod flags;

/// Something that consumes command line arguments.
///
/// Each command hands every argument to a list of targets in turn, and the
/// first target that returns `true` from `configure` takes it.
pub trait Configurable: Debug {
    fn configure(
        &mut self,
        p: &mut Parser,
        arg: &mut Arg,
    ) -> anyhow::Result<bool>;

    /// Docs for the flags and arguments taken by this target.
    fn usage(&self) -> &[Usage] {
        &[]
    }
}

/// Feeds every remaining argument in `p` to `targets`.
///
/// `usage` is the command's help text. `-h` and `--help` are handled here
/// and returned as a `Help` error.
pub fn configure(
    p: &mut Parser,
    usage: &str,
    targets: &mut [&mut dyn Configurable],
) -> anyhow::Result<()> {
    while let Some(arg) = p.next()? {
        if let Arg::Short('h') | Arg::Long("help") = arg {
            let long = arg == Arg::Long("help");
            let help = Help::render(usage, targets, long);
            return Err(anyhow::Error::from(help));
        }
        // Long flag names borrow from the parser, which the targets need
        // mutably, so they are copied out first.
        let name: String;
        let mut arg = match arg {
            Arg::Long(long) => {
                name = long.to_string();
                Arg::Long(&name)
            }
            Arg::Short(c) => Arg::Short(c),
            Arg::Value(v) => Arg::Value(v),
        };
        let mut taken = false;
        for t in targets.iter_mut() {
            if t.configure(p, &mut arg)? {
                taken = true;
                break;
            }
        }
        if !taken {
            return Err(arg.unexpected().into());
        }
    }
    Ok(())
}

/// Parses the next argument as a command name.
///
/// With no argument, the usage itself becomes the error. `-h/--help` and
/// `--version` are turned into `Help` and `Version` errors.
pub fn next_as_command(usage: &str, p: &mut Parser) -> anyhow::Result<String> {
    let usage = usage.trim();
    let Some(arg) = p.next()? else { anyhow::bail!("{usage}") };
    match arg {
        Arg::Value(cmd) => Ok(cmd.string()?),
        Arg::Short('h') | Arg::Long("help") => {
            Err(anyhow::Error::from(Help(usage.to_string())))
        }
        Arg::Long("version") => Err(anyhow::Error::from(Version)),
        arg => Err(arg.unexpected().into()),
    }
}

/// Parses the value of a flag into `T`, naming the flag in any error.
pub fn parse<T>(p: &mut Parser, flag_name: &'static str) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: Display + Debug + Send + Sync + 'static,
{
    let osv = p.value().context(flag_name)?;
    let Some(value) = osv.to_str() else {
        let err = lexopt::Error::NonUnicodeValue(osv.clone());
        return Err(anyhow::Error::from(err).context(flag_name));
    };
    // The `FromStr` errors here are usually `anyhow::Error`, which doesn't
    // implement `std::error::Error`.
    value.parse().map_err(|err| anyhow::Error::msg(err).context(flag_name))
}

/// The documentation of one flag or positional argument.
#[derive(Clone, Copy, Debug)]
pub struct Usage {
    /// Flags are optional. Everything else is a required argument.
    pub flag: bool,
    /// For example, `-d/--date <date>`.
    pub format: &'static str,
    /// One line, shown by `-h`.
    pub short: &'static str,
    /// Paragraphs separated by blank lines, shown by `--help`.
    pub long: &'static str,
}

impl Usage {
    pub const fn flag(
        format: &'static str,
        short: &'static str,
        long: &'static str,
    ) -> Usage {
        Usage { flag: true, format, short, long }
    }

    pub const fn arg(
        format: &'static str,
        short: &'static str,
        long: &'static str,
    ) -> Usage {
        Usage { flag: false, format, short, long }
    }

    /// Formats a table with each format next to its short description.
    pub fn short(usages: &[Usage]) -> String {
        let Some(width) = usages.iter().map(|u| u.format.len()).max() else {
            return String::new();
        };
        usages
            .iter()
            .map(|u| format!("    {:width$}  {}\n", u.format, u.short))
            .collect()
    }

    /// Formats each format with its long description wrapped and indented
    /// below it.
    pub fn long(usages: &[Usage]) -> String {
        let wrap = textwrap::Options::new(79)
            .initial_indent("        ")
            .subsequent_indent("        ");
        let mut blocks = vec![];
        for usage in usages {
            let paragraphs: Vec<String> = usage
                .long
                .trim()
                .split("\n\n")
                .map(|p| textwrap::fill(&p.replace('\n', " "), &wrap))
                .collect();
            blocks.push(format!(
                "    {}\n{}\n",
                usage.format,
                paragraphs.join("\n\n"),
            ));
        }
        blocks.join("\n")
    }
}

/// Help output. `main` prints it to stdout and exits successfully.
#[derive(Debug)]
pub struct Help(String);

impl Help {
    const USAGE: Usage = Usage::flag(
        "-h/--help",
        "Print short (-h) or long (--help) help output.",
        r#"
Print help output. -h shows one line for every flag while --help shows the
complete documentation.
"#,
    );

    /// Fills in a command's usage text for `-h` or, if `long` is set,
    /// `--help`.
    ///
    /// Everything between `%snip-start%` and `%snip-end%` only appears in
    /// the long form. `%args%` and `%flags%` are replaced by the docs of the
    /// given targets.
    fn render(
        usage: &str,
        targets: &[&mut dyn Configurable],
        long: bool,
    ) -> Help {
        static SNIPPED: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?m)^\s*%snip-start%\p{any}*?%snip-end%\s*$")
                .unwrap()
        });
        static MARKERS: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?m)^\s*%snip-(start|end)%\s*$").unwrap()
        });

        let docs = |flag: bool| -> Vec<Usage> {
            let mut usages =
                if flag { vec![Help::USAGE, Version::USAGE] } else { vec![] };
            for t in targets {
                usages.extend(t.usage().iter().filter(|u| u.flag == flag));
            }
            usages
        };
        // Positional arguments keep the order they are parsed in.
        let args = docs(false);
        let mut flags = docs(true);
        flags.sort_by_key(|u| u.format.trim_start_matches('-'));
        let (usage, args, flags) = if long {
            let usage = MARKERS.replace_all(usage, "");
            (usage, Usage::long(&args), Usage::long(&flags))
        } else {
            let usage = SNIPPED.replace_all(usage, "");
            (usage, Usage::short(&args), Usage::short(&flags))
        };
        let usage = usage.replace("%args%", &args).replace("%flags%", &flags);
        Help(usage.trim().to_string())
    }
}

impl Display for Help {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Help {}

/// Version output. `main` prints it to stdout and exits successfully.
#[derive(Debug)]
pub struct Version;

impl Version {
    const USAGE: Usage = Usage::flag(
        "--version",
        "Print the version of fortnight.",
        r#"
Print the version of fortnight.
"#,
    );
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let semver = option_env!("CARGO_PKG_VERSION").unwrap_or("N/A");
        match option_env!("FORTNIGHT_BUILD_GIT_HASH") {
            None => write!(f, "fortnight {semver}"),
            Some(hash) => write!(f, "fortnight {semver} (rev {hash})"),
        }
    }
}

impl std::error::Error for Version {}

#[cfg(test)]
mod tests {
    use super::*;

    const USAGE: &str = r#"
Do a thing.

EXAMPLES:
    $ thing

    %snip-start%

    $ thing --loudly

    %snip-end%
OPTIONS:
%flags%
"#;

    #[derive(Debug, Default)]
    struct Loud(bool);

    impl Configurable for Loud {
        fn configure(
            &mut self,
            _: &mut Parser,
            arg: &mut Arg,
        ) -> anyhow::Result<bool> {
            match *arg {
                Arg::Long("loudly") => self.0 = true,
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn usage(&self) -> &[Usage] {
            const USAGES: &[Usage] = &[Usage::flag(
                "--loudly",
                "Do it loudly.",
                "Do it loudly.\n\nVery loudly.",
            )];
            USAGES
        }
    }

    fn run(args: &[&str]) -> anyhow::Result<Loud> {
        let mut p = Parser::from_args(args);
        let mut loud = Loud::default();
        configure(&mut p, USAGE, &mut [&mut loud])?;
        Ok(loud)
    }

    fn help(args: &[&str]) -> String {
        let err = run(args).unwrap_err();
        err.downcast_ref::<Help>().unwrap().to_string()
    }

    #[test]
    fn targets_take_arguments() {
        assert!(run(&["--loudly"]).unwrap().0);
        assert!(!run(&[]).unwrap().0);
        insta::assert_snapshot!(
            run(&["--quietly"]).unwrap_err(),
            @"invalid option '--quietly'",
        );
    }

    #[test]
    fn short_help() {
        insta::assert_snapshot!(help(&["-h"]), @r"
        Do a thing.

        EXAMPLES:
            $ thing

        OPTIONS:
            -h/--help  Print short (-h) or long (--help) help output.
            --loudly   Do it loudly.
            --version  Print the version of fortnight.
        ");
    }

    #[test]
    fn long_help() {
        insta::assert_snapshot!(help(&["--help"]), @r"
        Do a thing.

        EXAMPLES:
            $ thing

            $ thing --loudly

        OPTIONS:
            -h/--help
                Print help output. -h shows one line for every flag while --help shows
                the complete documentation.

            --loudly
                Do it loudly.

                Very loudly.

            --version
                Print the version of fortnight.
        ");
    }
}
