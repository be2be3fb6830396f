//! Random graph data for integration tests

use tripleplan::types::{Item, Literal, Triple, TriplePattern};

pub const EX: &str = "http://ex/";

/// IRI `http://ex/<name>`
pub fn ex(name: impl std::fmt::Display) -> Literal {
    Literal::iri(format!("{}{}", EX, name))
}

/// Node IRI for a numbered vertex
pub fn node(n: u32) -> Literal {
    ex(format!("n{}", n))
}

/// Triples `node(s) ex(predicate) node(o)`
pub fn edges(list: &[(u32, &str, u32)]) -> Vec<Triple> {
    list.iter()
        .map(|(s, p, o)| Triple::new(node(*s), ex(p), node(*o)))
        .collect()
}

/// Random directed edges over `nodes` vertices, each labelled with one of
/// `predicates`; self-loops and duplicates are allowed
pub fn random_edges(
    rng: &mut fastrand::Rng,
    nodes: u32,
    count: usize,
    predicates: &[&str],
) -> Vec<Triple> {
    (0..count)
        .map(|_| {
            let s = rng.u32(0..nodes);
            let o = rng.u32(0..nodes);
            let p = predicates[rng.usize(..predicates.len())];
            Triple::new(node(s), ex(p), node(o))
        })
        .collect()
}

/// Pattern term: `?name` is a variable, anything else an `ex:` IRI
pub fn term(text: &str) -> Item {
    match text.strip_prefix('?') {
        Some(name) => Item::var(name),
        None => Item::Lit(ex(text)),
    }
}

/// Triple pattern written with [`term`] notation
pub fn tp(subject: &str, predicate: &str, object: &str) -> TriplePattern {
    TriplePattern::new(term(subject), term(predicate), term(object))
}

/// Three people in two departments; only the first has an email address
pub fn people() -> Vec<Triple> {
    let mut triples = Vec::new();
    let rows = [(1, "alice", 25, "d1", true), (2, "bob", 35, "d1", false), (3, "carol", 45, "d2", false)];
    for (n, name, age, dept, email) in rows {
        let person = node(n);
        triples.push(Triple::new(person.clone(), ex("type"), ex("Person")));
        triples.push(Triple::new(person.clone(), ex("name"), Literal::simple(name)));
        triples.push(Triple::new(person.clone(), ex("age"), Literal::integer(age)));
        triples.push(Triple::new(person.clone(), ex("dept"), ex(dept)));
        if email {
            triples.push(Triple::new(person, ex("email"), Literal::simple(format!("{}@example.org", name))));
        }
    }
    triples
}
