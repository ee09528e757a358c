//! Collector visitors and navigators over parsed commands.

use fedq_lang::{
    ElementCollectorVisitor, Function, GroupCollectorVisitor, GroupSymbol, LanguageVisitor,
    DeepPreOrderNavigator, PreOrderNavigator, QueryParser, Reference, ReferenceCollectorVisitor,
};

fn names(groups: &[GroupSymbol]) -> Vec<String> {
    groups.iter().map(|g| g.name.clone()).collect()
}

#[derive(Default)]
struct FunctionNames(Vec<String>);

impl LanguageVisitor for FunctionNames {
    fn visit_function(&mut self, obj: &Function) {
        self.0.push(obj.name.to_ascii_lowercase());
    }
}

#[test]
fn test_inline_view_groups_are_not_reported() {
    let command = QueryParser::parse_command(
        "SELECT a.e1 FROM pm1.g1 AS a, (SELECT e1 FROM pm1.g2) AS x WHERE a.e1 = x.e1",
    )
    .expect("parse");
    let groups = GroupCollectorVisitor::get_groups_ignore_inline_views(&command, true);
    assert_eq!(names(&groups), vec!["a"]);
    assert_eq!(groups[0].non_correlation_name(), "pm1.g1");
}

#[test]
fn test_outer_group_survives_the_same_group_inside_an_inline_view() {
    let command = QueryParser::parse_command(
        "SELECT pm1.g1.e1 FROM pm1.g1, (SELECT e1 FROM pm1.g1) AS x WHERE pm1.g1.e1 = x.e1",
    )
    .expect("parse");
    let groups = GroupCollectorVisitor::get_groups_ignore_inline_views(&command, true);
    assert_eq!(names(&groups), vec!["pm1.g1"]);
}

#[test]
fn test_nested_subqueries_are_visited_only_when_deep() {
    let command = QueryParser::parse_command(
        "SELECT e1 FROM pm1.g1 WHERE EXISTS (SELECT e1 FROM pm1.g2 WHERE e2 = ?) AND e3 IN (1, 2)",
    )
    .expect("parse");
    assert_eq!(names(&GroupCollectorVisitor::get_groups(&command, true)), vec!["pm1.g1"]);
    assert_eq!(
        names(&GroupCollectorVisitor::get_groups_ignore_inline_views(&command, true)),
        vec!["pm1.g1", "pm1.g2"]
    );

    let shallow: Vec<String> = ElementCollectorVisitor::get_elements(&command, true)
        .iter()
        .map(|e| e.name())
        .collect();
    assert_eq!(shallow, vec!["e1", "e3"]);
    let deep = ElementCollectorVisitor::get_elements_deep(&command);
    assert!(deep.iter().any(|e| e.name() == "e2"));
}

#[test]
fn test_references_are_numbered_in_order() {
    let command =
        QueryParser::parse_command("SELECT e1 FROM pm1.g1 WHERE e1 = ? AND e2 > ? OR e3 = ?")
            .expect("parse");
    assert_eq!(
        ReferenceCollectorVisitor::get_references(&command),
        vec![
            Reference::positional(0),
            Reference::positional(1),
            Reference::positional(2)
        ]
    );
}

#[test]
fn test_custom_visitor_sees_every_function() {
    let command = QueryParser::parse_command(
        "SELECT upper(e1), e2 + 1 FROM pm1.g1 WHERE length(trim(e1)) > 2 \
         AND EXISTS (SELECT lower(e1) FROM pm1.g2)",
    )
    .expect("parse");

    let mut shallow = FunctionNames::default();
    PreOrderNavigator::do_visit(&command, &mut shallow);
    assert!(shallow.0.contains(&"upper".to_string()));
    assert!(shallow.0.contains(&"trim".to_string()));
    assert!(!shallow.0.contains(&"lower".to_string()));

    let mut deep = FunctionNames::default();
    DeepPreOrderNavigator::do_visit(&command, &mut deep);
    assert!(deep.0.contains(&"lower".to_string()));
    // pre-order puts the outer call before its argument
    let length = deep.0.iter().position(|n| n == "length").unwrap();
    let trim = deep.0.iter().position(|n| n == "trim").unwrap();
    assert!(length < trim);
}

#[test]
fn test_into_target_is_reported_first() {
    let command = QueryParser::parse_command("SELECT e1 INTO pm1.g2 FROM pm1.g1").expect("parse");
    assert_eq!(
        names(&GroupCollectorVisitor::get_groups(&command, false)),
        vec!["pm1.g2", "pm1.g1"]
    );
    let command = QueryParser::parse_command("SELECT e1 INTO #temp FROM pm1.g1").expect("parse");
    assert_eq!(names(&GroupCollectorVisitor::get_groups(&command, false)), vec!["pm1.g1"]);
}
