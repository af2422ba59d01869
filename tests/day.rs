use crate::{TempDir, WORK, command::assert_cmd_snapshot, fortnight};

#[test]
fn basic() {
    let dir = TempDir::with_work();
    // Unlike in the grid, the summary of an all-day event is always shown.
    assert_cmd_snapshot!(
        dir.fortnight(["day", "2024-07-19", "work.ics"]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Fri 2024-07-19
      < Offsite ]
      09:30 Standup

    ----- stderr -----
    ",
    );
}

#[test]
fn empty_day() {
    let dir = TempDir::with_work();
    assert_cmd_snapshot!(
        dir.fortnight(["day", "yesterday", "work.ics"]),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Tue 2024-07-16

    ----- stderr -----
    ",
    );
}

#[test]
fn json() {
    let dir = TempDir::with_work();
    assert_cmd_snapshot!(
        dir.fortnight(["day", "-f", "json", "2024-07-19", "work.ics"]),
        @r#"
    success: true
    exit_code: 0
    ----- stdout -----
    {
      "date": "2024-07-19",
      "entries": [
        {
          "kind": "all-day",
          "start": "2024-07-18",
          "end": "2024-07-19",
          "summary": "Offsite",
          "span": {
            "is_start": false,
            "is_end": true,
            "show_summary": true
          }
        },
        {
          "kind": "timed",
          "start": "09:30:00",
          "end": "2024-07-19T09:45:00",
          "summary": "Standup"
        }
      ]
    }

    ----- stderr -----
    "#,
    );
}

#[test]
fn stdin() {
    assert_cmd_snapshot!(
        fortnight(["day", "today", "-"]).stdin(WORK),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Wed 2024-07-17 *
      09:30 Standup

    ----- stderr -----
    ",
    );
}

#[test]
fn display_time_zone() {
    let dir = TempDir::with_work();
    // The call is at 19:00 UTC, which is the next morning in Tokyo. Timed
    // entries keep the order in which their events were found.
    assert_cmd_snapshot!(
        dir.fortnight(["day", "2024-07-24", "work.ics"])
            .env("TZ", "Asia/Tokyo"),
        @r"
    success: true
    exit_code: 0
    ----- stdout -----
    Wed 2024-07-24
      22:30 Standup
      04:00 Call with London

    ----- stderr -----
    ",
    );
}

#[test]
fn missing_date() {
    assert_cmd_snapshot!(
        fortnight(["day"]),
        @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    missing required <date>
    ",
    );
}
