use philodb_core::similarity::mean;
use philodb_core::types::Corpus;

/// One mean vector per school, schools in alphabetical order.
///
/// Row `i` of every matrix and leaf `i` of every linkage built from this value
/// refers to `names[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolVectors {
    pub names: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

impl SchoolVectors {
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let groups = corpus.school_groups();
        let mut names = Vec::with_capacity(groups.len());
        let mut vectors = Vec::with_capacity(groups.len());
        for (school, idxs) in groups {
            let rows = idxs.iter().filter_map(|&i| corpus.embedding(i));
            vectors.push(mean(rows, corpus.dim()));
            names.push(school);
        }
        Self { names, vectors }
    }

    pub fn len(&self) -> usize { self.names.len() }
    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn get(&self, school: &str) -> Option<&[f32]> {
        let i = self.names.iter().position(|n| n == school)?;
        Some(&self.vectors[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use philodb_core::types::Passage;

    #[test]
    fn means_are_per_school_and_sorted() {
        let passages = vec![
            Passage::new("a", "zeno", "t", "x"),
            Passage::new("b", "aristotle", "t", "x"),
            Passage::new("c", "zeno", "t", "x"),
        ];
        let corpus = Corpus::new(2, passages, vec![vec![1.0, 0.0], vec![0.0, 4.0], vec![3.0, 2.0]]).unwrap();
        let sv = SchoolVectors::from_corpus(&corpus);
        assert_eq!(sv.names, vec!["aristotle", "zeno"]);
        assert_eq!(sv.get("zeno"), Some(&[2.0, 1.0][..]));
        assert_eq!(sv.get("aristotle"), Some(&[0.0, 4.0][..]));
        assert_eq!(sv.get("plato"), None);
    }
}
