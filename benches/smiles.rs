use molbert::featurizer::{SmilesIndexFeaturizer, Vocabulary};
use molbert::smiles::{tokenize, validate};

fn main() {
    divan::main();
}

const SMILES: [&str; 3] = [
    "CCO",
    "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
    "CC(C)C[C@H](NC(=O)[C@@H](Cc1ccccc1)NC(=O)c1cnccn1)B(O)O",
];

#[divan::bench(args = SMILES)]
fn validate_smiles(smiles: &str) {
    validate(divan::black_box(smiles)).unwrap();
}

#[divan::bench(args = SMILES)]
fn tokenize_smiles(smiles: &str) -> usize {
    tokenize(divan::black_box(smiles)).unwrap().len()
}

#[divan::bench(args = SMILES)]
fn encode(bencher: divan::Bencher, smiles: &str) {
    let f = SmilesIndexFeaturizer::new(Vocabulary::default(), 200).unwrap();
    bencher.bench_local(|| f.encode(divan::black_box(smiles)).unwrap());
}
