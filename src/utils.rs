//! Number-theory utilities shared by the cryptosystems and protocols

use num_bigint::{BigInt, BigUint, RandBigInt, ToBigInt};
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::thread_rng;

use crate::error::{HomomorphicError, Result};

/// Modular exponentiation: base^exp mod modulus
pub fn mod_exp(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// Compute modular inverse using the extended Euclidean algorithm
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (gcd, x, _) = extended_gcd(&a.to_bigint().unwrap(), &m.to_bigint().unwrap());

    if gcd != BigInt::one() {
        return None;
    }

    Some(posmod(&x, m))
}

/// Extended Euclidean algorithm (using BigInt to handle negative intermediate values)
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if a == &BigInt::zero() {
        return (b.clone(), BigInt::zero(), BigInt::one());
    }

    let (gcd, x1, y1) = extended_gcd(&(b % a), a);
    let x = y1 - (b / a) * &x1;
    let y = x1;

    (gcd, x, y)
}

/// Canonical representative of `a` modulo `n`, in `[0, n)`
pub fn posmod(a: &BigInt, n: &BigUint) -> BigUint {
    let n_int = n.to_bigint().unwrap();
    let mut r = a % &n_int;
    if r.is_negative() {
        r += &n_int;
    }
    r.to_biguint().unwrap()
}

/// Uniform random integer in `[0, 2^bits)`
pub fn random_bits(bits: u64) -> BigUint {
    thread_rng().gen_biguint(bits)
}

/// Uniform random element of `[1, n)` coprime to `n`
pub fn random_coprime(n: &BigUint) -> BigUint {
    let mut rng = thread_rng();
    loop {
        let r = rng.gen_biguint_range(&BigUint::one(), n);
        if r.gcd(n).is_one() {
            return r;
        }
    }
}

/// Generate a random probable prime of exactly `bits` bits
pub fn random_prime(bits: u64) -> Result<BigUint> {
    let mut rng = thread_rng();
    let max_iterations = 100_000;
    let mut iterations = 0;

    loop {
        iterations += 1;
        if iterations > max_iterations {
            return Err(HomomorphicError::KeyParamInvalid(format!(
                "failed to find a {bits}-bit prime after {max_iterations} candidates"
            )));
        }

        // Force the top bit (exact bit length) and the low bit (odd)
        let candidate = rng.gen_biguint(bits) | (BigUint::one() << (bits - 1)) | BigUint::one();

        if is_probable_prime(&candidate, 20) {
            return Ok(candidate);
        }
    }
}

/// Combine residues `x mod p` and `x mod q` into the unique `x mod p*q`
pub fn crt_combine(xp: &BigUint, p: &BigUint, xq: &BigUint, q: &BigUint) -> Result<BigUint> {
    let p_inv = mod_inverse(&(p % q), q).ok_or_else(|| {
        HomomorphicError::KeyParamInvalid("CRT moduli are not coprime".to_string())
    })?;
    let diff = xq.to_bigint().unwrap() - xp.to_bigint().unwrap();
    let k = (posmod(&diff, q) * p_inv) % q;
    Ok(xp + p * k)
}

/// Jacobi symbol (a/n); `n` must be odd and positive
pub fn jacobi(a: &BigUint, n: &BigUint) -> i8 {
    debug_assert!(n.is_odd() && !n.is_zero());
    let mut a = a % n;
    let mut n = n.clone();
    let mut result: i8 = 1;

    while !a.is_zero() {
        while a.is_even() {
            a >>= 1;
            let r = (&n % 8u32).to_u8().unwrap();
            if r == 3 || r == 5 {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if (&a % 4u32).to_u8().unwrap() == 3 && (&n % 4u32).to_u8().unwrap() == 3 {
            result = -result;
        }
        a %= &n;
    }

    if n.is_one() {
        result
    } else {
        0
    }
}

/// Probabilistic primality test: trial division, Miller-Rabin with `k`
/// random bases, then a strong Lucas test on survivors
pub fn is_probable_prime(n: &BigUint, k: usize) -> bool {
    if n <= &BigUint::one() {
        return false;
    }

    const SMALL_PRIMES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    for sp in SMALL_PRIMES {
        let sp = BigUint::from(sp);
        if n == &sp {
            return true;
        }
        if (n % &sp).is_zero() {
            return false;
        }
    }

    miller_rabin(n, k) && strong_lucas(n)
}

/// Miller-Rabin primality test with `k` random bases
fn miller_rabin(n: &BigUint, k: usize) -> bool {
    let mut rng = thread_rng();
    let n_minus_1 = n - BigUint::one();
    let (s, d) = factor_powers_of_two(&n_minus_1);
    let two = BigUint::from(2u32);

    'witness: for _ in 0..k {
        let a = rng.gen_biguint_range(&two, &n_minus_1);
        let mut x = mod_exp(&a, &d, n);

        if x.is_one() || x == n_minus_1 {
            continue;
        }

        for _ in 0..s - 1 {
            x = mod_exp(&x, &two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Strong Lucas probable-prime test with Selfridge's parameter choice
fn strong_lucas(n: &BigUint) -> bool {
    // Find D in 5, -7, 9, -11, ... with (D/n) = -1
    let mut d: i64 = 5;
    loop {
        let d_mag = BigUint::from(d.unsigned_abs());
        let j = if d > 0 {
            jacobi(&d_mag, n)
        } else {
            // (-1/n) = (-1)^((n-1)/2)
            let neg_one = if (n % 4u32).to_u8().unwrap() == 3 { -1 } else { 1 };
            neg_one * jacobi(&d_mag, n)
        };
        if j == 0 {
            // Shares a factor with n
            return &d_mag == n;
        }
        if j == -1 {
            break;
        }
        if d == 13 {
            // A square never yields (D/n) = -1; rule it out once
            let r = n.sqrt();
            if &r * &r == *n {
                return false;
            }
        }
        d = if d > 0 { -(d + 2) } else { -(d - 2) };
    }

    let n_int = n.to_bigint().unwrap();
    let d_int = BigInt::from(d);
    // P = 1, Q = (1 - D) / 4
    let q_int: BigInt = (BigInt::one() - &d_int) / 4;

    let n_plus_1 = n + BigUint::one();
    let (s, dd) = factor_powers_of_two(&n_plus_1);

    // Halve modulo the odd n
    let halve = |x: BigInt| -> BigInt {
        if x.is_odd() {
            (x + &n_int) >> 1
        } else {
            x >> 1
        }
    };
    let reduce = |x: BigInt| -> BigInt { posmod(&x, n).to_bigint().unwrap() };

    // Binary ladder over the bits of dd, most significant first
    let mut u = BigInt::one();
    let mut v = BigInt::one(); // V_1 = P = 1
    let mut qk = q_int.clone(); // Q^1
    let bits = dd.bits();
    for i in (0..bits - 1).rev() {
        // Index doubling: k -> 2k
        u = reduce(&u * &v);
        v = reduce(&v * &v - BigInt::from(2) * &qk);
        qk = reduce(&qk * &qk);
        if ((&dd >> i) & BigUint::one()).is_one() {
            // 2k -> 2k + 1
            let u_next = halve(reduce(&u + &v));
            let v_next = halve(reduce(&d_int * &u + &v));
            u = reduce(u_next);
            v = reduce(v_next);
            qk = reduce(&qk * &q_int);
        }
    }

    if u.is_zero() || v.is_zero() {
        return true;
    }
    for _ in 1..s {
        v = reduce(&v * &v - BigInt::from(2) * &qk);
        if v.is_zero() {
            return true;
        }
        qk = reduce(&qk * &qk);
    }

    false
}

/// Factor out powers of 2 from n
fn factor_powers_of_two(n: &BigUint) -> (u64, BigUint) {
    let mut s = 0;
    let mut d = n.clone();

    while d.is_even() {
        d >>= 1;
        s += 1;
    }

    (s, d)
}
