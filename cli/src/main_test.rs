use super::*;

#[test]
fn display_size_parses() {
    let size = parse_display("640x480").unwrap();
    assert!((size.width - 640.0).abs() < f64::EPSILON);
    assert!((size.height - 480.0).abs() < f64::EPSILON);
    assert!(parse_display("640").is_err());
    assert!(parse_display("0x480").is_err());
    assert!(parse_display("wide x tall").is_err());
}

#[test]
fn offset_accepts_negative_values() {
    assert_eq!(parse_offset("-20, 15").unwrap(), Offset { dx: -20.0, dy: 15.0 });
    assert!(parse_offset("20").is_err());
}

#[test]
fn list_args_become_a_list_query() {
    let args = CourseListArgs {
        search: Some("rust".into()),
        price: Some("free".into()),
        sort: SortKey::PriceLow,
        page: 2,
        page_size: 6,
        ..CourseListArgs::default()
    };
    let query = args.to_query().unwrap();
    assert_eq!(query.criteria.price_range, Some(PriceRange::Free));
    assert_eq!(query.criteria.search.as_deref(), Some("rust"));
    assert_eq!(query.sort, SortKey::PriceLow);
    assert_eq!((query.page, query.page_size), (2, 6));
}

#[test]
fn price_all_means_no_bucket() {
    let args = CourseListArgs { price: Some("all".into()), ..CourseListArgs::default() };
    assert_eq!(args.to_query().unwrap().criteria.price_range, None);

    let bad = CourseListArgs { price: Some("cheap".into()), ..CourseListArgs::default() };
    assert!(matches!(bad.to_query(), Err(CliError::Listing(_))));
}

#[test]
fn form_args_only_override_given_fields() {
    let mut wizard = CourseWizard::new();
    wizard.form_mut().description = "Kept".into();
    let args = CourseFormArgs { title: Some("New".into()), price: Some("12".into()), ..CourseFormArgs::default() };
    args.apply(&mut wizard).unwrap();
    assert_eq!(wizard.form().title, "New");
    assert_eq!(wizard.form().description, "Kept");
    assert_eq!(wizard.form().price, "12");
    assert!(wizard.thumbnail().is_none());
}

#[test]
fn cli_parses_nested_commands() {
    let cli = Cli::try_parse_from(["coursehub", "admin", "users", "set-active", "u1", "false"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Admin(AdminCommand { command: AdminSubcommand::Users(UsersSubcommand::SetActive { ref id, active: false }) })
            if id == "u1"
    ));

    let cli = Cli::try_parse_from(["coursehub", "admin", "users", "set-role", "u1", "instructor"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Admin(AdminCommand { command: AdminSubcommand::Users(UsersSubcommand::SetRole { role: Role::Instructor, .. }) })
    ));

    assert!(Cli::try_parse_from(["coursehub", "admin", "users", "set-role", "u1", "owner"]).is_err());
}

#[test]
fn avatar_defaults() {
    let cli = Cli::try_parse_from(["coursehub", "avatar", "me.png", "-o", "out.jpg", "--drag", "-10,5"]).unwrap();
    let Command::Avatar(args) = cli.command else {
        panic!("expected avatar command");
    };
    assert!((args.display.width - 400.0).abs() < f64::EPSILON);
    assert_eq!(args.drag, Some(Offset { dx: -10.0, dy: 5.0 }));
    assert!(!args.data_url);
}
