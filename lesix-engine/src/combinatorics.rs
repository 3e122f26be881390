/// C(n, r), saturé à `u64::MAX`.
pub fn binomial(n: usize, r: usize) -> u64 {
    if r > n {
        return 0;
    }
    let r = r.min(n - r);
    let mut acc: u128 = 1;
    for i in 0..r {
        // acc vaut C(n, i) : la division est exacte
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Fresh,
    Running,
    Done,
}

/// Énumération paresseuse des r-parties de `0..n` en ordre lexicographique.
///
/// L'itérateur ne garde que la combinaison courante ; un `clone()` redémarre
/// depuis la même position, et `starting_at` saute directement à un rang, ce
/// qui permet de découper l'espace en tranches indépendantes.
#[derive(Debug, Clone)]
pub struct Subsets {
    n: usize,
    indices: Vec<usize>,
    cursor: Cursor,
}

impl Subsets {
    pub fn new(n: usize, r: usize) -> Self {
        Self::starting_at(n, r, 0)
    }

    pub fn starting_at(n: usize, r: usize, rank: u64) -> Self {
        if r > n || rank >= binomial(n, r) {
            return Self {
                n,
                indices: Vec::new(),
                cursor: Cursor::Done,
            };
        }
        Self {
            n,
            indices: unrank(n, r, rank),
            cursor: Cursor::Fresh,
        }
    }

    /// Avance d'un cran et expose les indices sans allocation.
    pub fn next_indices(&mut self) -> Option<&[usize]> {
        match self.cursor {
            Cursor::Fresh => self.cursor = Cursor::Running,
            Cursor::Running => {
                if !self.advance() {
                    self.cursor = Cursor::Done;
                    return None;
                }
            }
            Cursor::Done => return None,
        }
        Some(&self.indices)
    }

    /// Adapte l'énumération en masques de bits sur les numéros de `base`.
    pub fn masks(self, base: &[u8]) -> Masks<'_> {
        Masks { inner: self, base }
    }

    fn advance(&mut self) -> bool {
        let r = self.indices.len();
        let mut i = r;
        while i > 0 {
            i -= 1;
            if self.indices[i] < self.n - r + i {
                self.indices[i] += 1;
                for j in i + 1..r {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return true;
            }
        }
        false
    }
}

impl Iterator for Subsets {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        self.next_indices().map(|s| s.to_vec())
    }
}

pub struct Masks<'a> {
    inner: Subsets,
    base: &'a [u8],
}

impl Iterator for Masks<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let base = self.base;
        self.inner.next_indices().map(|idx| mask_of(base, idx))
    }
}

fn unrank(n: usize, r: usize, mut rank: u64) -> Vec<usize> {
    let mut indices = Vec::with_capacity(r);
    let mut x = 0;
    for i in 0..r {
        loop {
            let with_x = binomial(n - x - 1, r - i - 1);
            if rank < with_x {
                indices.push(x);
                x += 1;
                break;
            }
            rank -= with_x;
            x += 1;
        }
    }
    indices
}

pub fn mask_of(base: &[u8], indices: &[usize]) -> u64 {
    indices.iter().fold(0u64, |acc, &i| acc | (1u64 << base[i]))
}

/// Numéros présents dans le masque, en ordre croissant.
pub fn mask_numbers(mask: u64) -> Vec<u8> {
    (0..64u8).filter(|&b| (mask >> b) & 1 == 1).collect()
}
