use std::collections::{HashMap, HashSet};

use crate::models::{Course, User};

/// Prerequisite codes of `course` that `student` has not completed, in
/// declaration order.
pub fn missing_prerequisites(course: &Course, student: &User) -> Vec<String> {
    course
        .prerequisites
        .iter()
        .filter(|code| !student.has_completed(code))
        .cloned()
        .collect()
}

pub fn prerequisite_graph(courses: &[Course]) -> HashMap<&str, &[String]> {
    courses
        .iter()
        .map(|c| (c.code.as_str(), c.prerequisites.as_slice()))
        .collect()
}

/// Longest prerequisite path below `code`.
///
/// A code already on the current path contributes 0, so cycles terminate
/// instead of failing. Codes missing from the graph have no prerequisites.
pub fn chain_length(code: &str, graph: &HashMap<&str, &[String]>) -> usize {
    let mut path = HashSet::new();
    walk(code, graph, &mut path)
}

fn walk<'a>(code: &'a str, graph: &HashMap<&str, &'a [String]>, path: &mut HashSet<&'a str>) -> usize {
    if !path.insert(code) {
        return 0;
    }

    let depth = match graph.get(code) {
        Some(prereqs) if !prereqs.is_empty() => {
            1 + prereqs
                .iter()
                .map(|p| walk(p.as_str(), graph, path))
                .max()
                .unwrap_or(0)
        }
        _ => 0,
    };

    path.remove(code);
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Completion, CourseStatus, Grade, Role};

    fn course(code: &str, prereqs: &[&str]) -> Course {
        Course {
            code: code.to_string(),
            name: code.to_string(),
            category: "programming".to_string(),
            description: String::new(),
            prerequisites: prereqs.iter().map(|p| p.to_string()).collect(),
            status: CourseStatus::Open,
            classes: vec![],
        }
    }

    #[test]
    fn test_chain_length_linear() {
        let courses = vec![
            course("CS101", &[]),
            course("CS201", &["CS101"]),
            course("CS301", &["CS201"]),
            course("CS401", &["CS301", "CS101"]),
        ];
        let graph = prerequisite_graph(&courses);

        assert_eq!(chain_length("CS101", &graph), 0);
        assert_eq!(chain_length("CS201", &graph), 1);
        assert_eq!(chain_length("CS301", &graph), 2);
        assert_eq!(chain_length("CS401", &graph), 3);
    }

    #[test]
    fn test_chain_length_unknown_code() {
        let courses = vec![course("CS201", &["MATH100"])];
        let graph = prerequisite_graph(&courses);

        assert_eq!(chain_length("CS201", &graph), 1);
        assert_eq!(chain_length("NOPE", &graph), 0);
    }

    #[test]
    fn test_chain_length_cycle_terminates() {
        let courses = vec![
            course("A", &["B"]),
            course("B", &["A"]),
            course("SELF", &["SELF"]),
        ];
        let graph = prerequisite_graph(&courses);

        assert_eq!(chain_length("A", &graph), 2);
        assert_eq!(chain_length("B", &graph), 2);
        assert_eq!(chain_length("SELF", &graph), 1);
    }

    #[test]
    fn test_diamond_is_not_treated_as_cycle() {
        // D depends on B and C, both of which depend on A.
        let courses = vec![
            course("A", &[]),
            course("B", &["A"]),
            course("C", &["A"]),
            course("D", &["B", "C"]),
        ];
        let graph = prerequisite_graph(&courses);

        assert_eq!(chain_length("D", &graph), 2);
    }

    #[test]
    fn test_missing_prerequisites() {
        let student = User {
            id: "s1".to_string(),
            username: "s1".to_string(),
            password: String::new(),
            name: "Student".to_string(),
            role: Role::Student,
            completed_courses: vec![Completion {
                code: "CS101".to_string(),
                name: "Intro".to_string(),
                grade: Grade::B,
                description: String::new(),
            }],
            expertise: vec![],
        };

        let c = course("CS301", &["CS101", "CS201"]);
        assert_eq!(missing_prerequisites(&c, &student), vec!["CS201".to_string()]);

        let c = course("CS202", &["CS101"]);
        assert!(missing_prerequisites(&c, &student).is_empty());
    }
}
